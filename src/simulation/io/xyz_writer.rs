use crate::simulation::error::SimulationError;
use crate::simulation::events::{EventsSubscriber, FreewaySnapshot};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<File>),
    Closed,
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
            Sink::Closed => Err(std::io::Error::other("xyz file is already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
            Sink::Closed => Ok(()),
        }
    }
}

/// Frames for particle viewers. Every step after the initial placement becomes one frame: the
/// particle count, an empty comment line, two marker particles spanning the freeway and one line
/// `id lane position velocity` per car.
pub struct XyzTrajectoryWriter {
    sink: Sink,
}

impl XyzTrajectoryWriter {
    /// A path ending in `.gz` is written gzip compressed.
    pub fn new(path: &Path) -> Result<Self, SimulationError> {
        info!("Creating file: {path:?}");
        let file = File::create(path)?;
        let sink = if path.extension().is_some_and(|ext| ext == "gz") {
            Sink::Gzip(GzEncoder::new(file, Compression::fast()))
        } else {
            Sink::Plain(BufWriter::new(file))
        };
        Ok(XyzTrajectoryWriter { sink })
    }

    fn write_frame(&mut self, snapshot: &FreewaySnapshot) -> std::io::Result<()> {
        writeln!(self.sink, "{}", snapshot.vehicles.len() + 2)?;
        writeln!(self.sink)?;
        writeln!(self.sink, "-1 -1 -1 0 0.0001")?;
        writeln!(self.sink, "-2 {} {} 0 0.0001", snapshot.lanes, snapshot.length)?;
        for v in &snapshot.vehicles {
            writeln!(
                self.sink,
                "{} {} {} {}",
                v.id, v.lane, v.lane_position, v.velocity
            )?;
        }
        Ok(())
    }
}

impl EventsSubscriber for XyzTrajectoryWriter {
    fn receive_step(&mut self, snapshot: &FreewaySnapshot) -> Result<(), SimulationError> {
        if snapshot.step == 0 {
            return Ok(());
        }
        self.write_frame(snapshot)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SimulationError> {
        match std::mem::replace(&mut self.sink, Sink::Closed) {
            Sink::Plain(mut w) => w.flush()?,
            Sink::Gzip(w) => {
                w.finish()?;
            }
            Sink::Closed => {}
        }
        Ok(())
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
