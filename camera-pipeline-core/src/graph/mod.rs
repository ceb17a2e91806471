pub mod component;
pub mod component_graph;
pub mod connection;
pub mod port;
