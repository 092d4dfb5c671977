//! Server module: listens for TCP connections carrying signed requests from the region.
//!
//! One request per connection. The region half-closes after writing, so a
//! request is everything read until EOF.

use core::time::Duration;
use std::{
    env,
    io::{self, Read as _, Write as _},
    net::{TcpListener, TcpStream},
};

use clap::Parser;
use metalfleet_common::{DEFAULT_RACK_AGENT_PORT, MAX_MESSAGE_BYTES, RackResponse};
use secrecy::SecretString;

use crate::{
    handler::handle_request,
    neighbours::DEFAULT_NEIGHBOURS_FILE,
    validation::validate_request,
};

/// Environment variable holding the shared secret.
pub const SHARED_SECRET_ENV: &str = "METALFLEET_SHARED_SECRET";

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration options for running the `rack_agent` service.
#[derive(Debug, Parser, Clone)]
pub struct ServiceOptions {
    /// TCP port to listen on for incoming HMAC-signed requests.
    #[arg(long = "port", default_value_t = DEFAULT_RACK_AGENT_PORT)]
    pub port: u16,

    /// Neighbour table consulted on scan requests.
    #[arg(long = "neighbours-file", default_value = DEFAULT_NEIGHBOURS_FILE)]
    pub neighbours_file: String,

    /// Shared secret for validating incoming HMAC-signed requests.
    /// Usually set from environment variables, after parsing.
    #[clap(skip)]
    pub shared_secret: Option<SecretString>,
}

/// Starts the TCP listener and handles incoming connections in sequence.
///
/// # Errors
///
/// Returns an error if no shared secret is available or the port can't be bound.
pub fn start_rack_agent(mut config: ServiceOptions) -> io::Result<()> {
    let secret = match config.shared_secret.take() {
        Some(secret) => secret,
        None => env::var(SHARED_SECRET_ENV).map(SecretString::from).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{SHARED_SECRET_ENV} environment variable must be set or injected"),
            )
        })?,
    };
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)?;
    println!("Listening on {addr}");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => handle_client(stream, &config, &secret),
            Err(e) => {
                eprintln!("Connection failed: {e}");
            }
        }
    }
    Ok(())
}

/// Reads one request and answers it.
fn handle_client(mut stream: TcpStream, config: &ServiceOptions, secret: &SecretString) {
    let peer_addr = stream
        .peer_addr()
        .map_or_else(|_| "unknown".to_owned(), |a| a.to_string());
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        eprintln!("Failed to set read timeout ({peer_addr}): {e}");
    }

    let mut data = Vec::new();
    if let Err(e) = (&stream).take(MAX_MESSAGE_BYTES).read_to_end(&mut data) {
        eprintln!("Failed to read from stream ({peer_addr}): {e}");
        return;
    }

    let response = match validate_request(&data, secret) {
        Ok(request) => handle_request(&request, config),
        Err(reason) => {
            eprintln!("Rejected request from {peer_addr}: {reason}");
            RackResponse::failure(reason)
        }
    };

    let body = miniserde::json::to_string(&response);
    if let Err(e) = stream.write_all(body.as_bytes()) {
        eprintln!("Failed to write response to stream ({peer_addr}): {e}");
    }
}
