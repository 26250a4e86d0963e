pub mod asic;
pub mod byte;
pub mod daq;
pub mod event_queue;
pub mod fifo;
pub mod link;
pub mod mesh;
