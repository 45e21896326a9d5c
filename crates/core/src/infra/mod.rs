pub mod formatter;
pub mod remote;
pub mod storage;
