use crate::domain::model::ServiceEndpoint;
use crate::domain::ports::{Probe, Sleeper};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect-then-close. Nothing is written to the socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn connect(&self, endpoint: &ServiceEndpoint) -> std::io::Result<()> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        drop(stream);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Service;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let endpoint = ServiceEndpoint::new(Service::Web, "127.0.0.1", port);
        assert!(TcpProbe.connect(&endpoint).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_fails_on_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let endpoint = ServiceEndpoint::new(Service::Web, "127.0.0.1", port);
        assert!(TcpProbe.connect(&endpoint).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeper_waits_the_full_duration() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
