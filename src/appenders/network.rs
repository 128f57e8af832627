//! Outbound TCP connection used by the forwarder
//!
//! Wire format: one UTF-8 record per line, `\n` terminated, no framing and
//! no acknowledgement.

use crate::core::{encode_lines, LogRecord, LoggerError, Result};
use std::io::{BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A connected stream to an ingestion server
pub struct NetworkConnection {
    writer: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl NetworkConnection {
    /// Resolve `address` and connect to the first address that accepts.
    ///
    /// # Errors
    ///
    /// Returns the last connect error, or an invalid-configuration error if
    /// the address does not resolve.
    pub fn connect(
        address: &str,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self> {
        let addrs: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| {
                LoggerError::config("forwarder", format!("cannot resolve '{}': {}", address, e))
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    // Timeouts keep a stalled server from hanging the worker
                    stream.set_write_timeout(Some(write_timeout))?;
                    // Enable TCP_NODELAY for low-latency logging
                    stream.set_nodelay(true)?;
                    return Ok(Self {
                        writer: BufWriter::new(stream),
                        peer: addr,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => LoggerError::io_operation("connecting", format!("to {}", address), e),
            None => LoggerError::config("forwarder", format!("'{}' resolved to nothing", address)),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write every record as one line, then flush
    pub fn send_batch(&mut self, records: &[LogRecord]) -> Result<()> {
        self.writer.write_all(&encode_lines(records))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and close both directions
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let result = NetworkConnection::connect(
            &format!("127.0.0.1:{}", port),
            Duration::from_millis(200),
            Duration::from_millis(200),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unresolvable_address() {
        let err = NetworkConnection::connect(
            "not an address",
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_send_batch_writes_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let reader = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            BufReader::new(stream)
                .lines()
                .collect::<std::io::Result<Vec<_>>>()
                .unwrap()
        });

        let mut conn =
            NetworkConnection::connect(&addr, Duration::from_secs(1), Duration::from_secs(1))
                .unwrap();
        conn.send_batch(&[
            LogRecord::received("first", "test"),
            LogRecord::received("second", "test"),
        ])
        .unwrap();
        conn.close().unwrap();

        assert_eq!(reader.join().unwrap(), vec!["first", "second"]);
    }
}
