//! Background tasks that move frames between a WebSocket and a [`Channel`](crate::Channel).

pub(crate) mod read;
pub(crate) mod write;
