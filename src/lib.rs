//! Rehearse core library: scenario documents, the event scheduler, and the
//! rewrite driver shared by the CLI and embedding test harnesses.

#[path = "platform/config.rs"]
mod config;
#[path = "model/doc.rs"]
mod doc;
#[path = "runtime/driver.rs"]
mod driver;
#[path = "platform/envinfo.rs"]
mod envinfo;
#[path = "platform/error.rs"]
mod error;
#[path = "model/events.rs"]
mod events;
#[path = "model/failure.rs"]
mod failure;
#[path = "platform/fsutil.rs"]
mod fsutil;
#[path = "runtime/harness.rs"]
mod harness;
#[path = "model/matchers.rs"]
mod matchers;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "runtime/scheduler.rs"]
mod scheduler;
#[path = "cmd/subjects.rs"]
mod subjects;
#[path = "runtime/updates.rs"]
mod updates;

pub use config::*;
pub use doc::*;
pub use driver::*;
pub use envinfo::*;
pub use error::*;
pub use events::*;
pub use failure::*;
pub use fsutil::*;
pub use harness::*;
pub use matchers::*;
pub use reporting::*;
pub use scheduler::*;
pub use subjects::*;
pub use updates::*;
