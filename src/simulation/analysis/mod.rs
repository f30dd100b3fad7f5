pub mod flow_collector;
