mod dispatcher;
mod http_sink;

pub use dispatcher::{RequesterConfig, RequesterNotifier, StatusDispatch, StatusSink};
pub use http_sink::HttpStatusSink;
