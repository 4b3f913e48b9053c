pub mod communicator;
