// Poll loop: fetches the page's state resource, adapts its interval to recent
// activity, and reconciles fresh payloads against the rendered baseline.
//
// A fetch carries the last ETag so unchanged state costs a 304. A change of
// the server's version marker forces a full reload of the page state.

mod driver;
mod fetcher;
mod interval;
mod state;

pub use driver::{LoopExit, PollHandle, PollLoop};
pub use fetcher::{FetchFailure, FetchOutcome, HttpSource, PollSource, build_client, server_message};
pub use interval::AdaptiveInterval;
pub use state::{CycleOutcome, Navigation, PollState};
