//! Turns a validated request into the agent's response.

use metalfleet_common::{RackOperation, RackRequest, RackResponse};

use crate::{neighbours, server::ServiceOptions};

/// Executes `request` and builds the response for it.
#[must_use]
pub fn handle_request(request: &RackRequest, config: &ServiceOptions) -> RackResponse {
    match request.operation() {
        Some(RackOperation::Scan) => match neighbours::scan_file(&config.neighbours_file, &request.cidrs) {
            Ok(found) => RackResponse::ok(found),
            Err(e) => RackResponse::failure(format!(
                "Failed to read neighbour table {}: {e}",
                config.neighbours_file
            )),
        },
        Some(RackOperation::Status) => RackResponse::ok(Vec::new()),
        None => RackResponse::failure(format!("Unsupported operation: {}", request.operation)),
    }
}
