//! Active discovery: asking rack agents which neighbours they can see on a subnet.

mod orchestrator;
mod rpc;
mod summary;

pub use orchestrator::{ScanSettings, scan_subnet};
pub use rpc::{RackAgent, RackCallError, RackClient, TcpRackClient};
pub use summary::{DiscoveredNeighbour, ScanFailure, ScanSummary, summarize};
