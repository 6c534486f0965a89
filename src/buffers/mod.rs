// SPDX-License-Identifier: GPL-3.0-only

//! Frame buffer memory management: mapping and the request pool

pub mod mapper;
pub mod pool;

pub use mapper::{BufferMapper, MapMode, MappedFrameBuffer};
pub use pool::{RequestPool, RequestState};
