pub mod dispatcher;
pub mod policy;
pub mod shutdown;

pub use dispatcher::{Dispatcher, TickReport};
pub use policy::{DispatchSettings, RetryPolicy};
pub use shutdown::{Shutdown, ShutdownSignal};
