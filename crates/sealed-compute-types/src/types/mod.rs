//! Task lifecycle types.
//!
//! - [`ids`] - [`TaskId`], [`Address`]
//! - [`status`] - [`EthStatus`], [`EngStatus`], [`StatusCodes`]
//! - [`descriptor`] - [`TaskDescriptor`]
//! - [`record`] - [`LedgerRecord`], [`TaskRecord`]
//! - [`result`] - [`TaskResult`], [`TaskOutcome`]

pub mod descriptor;
pub mod ids;
pub mod record;
pub mod result;
pub mod status;

pub use descriptor::TaskDescriptor;
pub use ids::{parse_address, Address, TaskId};
pub use record::{LedgerRecord, TaskRecord};
pub use result::{TaskOutcome, TaskResult};
pub use status::{EngStatus, EthStatus, StatusCodes};
