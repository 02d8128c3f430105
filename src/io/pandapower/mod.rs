pub mod ecs_net_conv;
pub mod file_io;
pub use file_io::*;
