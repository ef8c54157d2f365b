use ts3query_transport::{TcpCarrier, TransportConfig};

use crate::error::Result;
use crate::session::{Session, SessionConfig};

/// Connect to a server query interface over plain TCP with default settings.
pub fn connect(addr: &str) -> Result<Session> {
    connect_with_config(addr, &TransportConfig::default(), SessionConfig::default())
}

/// Connect over plain TCP with explicit configuration.
///
/// Use [`TransportConfig::client_query`] for the client query plugin.
pub fn connect_with_config(
    addr: &str,
    transport_config: &TransportConfig,
    session_config: SessionConfig,
) -> Result<Session> {
    let carrier = TcpCarrier::connect(addr, transport_config)?;
    Ok(Session::from_transport(Box::new(carrier), session_config))
}

/// Connect to the SSH query interface.
#[cfg(feature = "ssh")]
pub fn connect_ssh(
    addr: &str,
    credentials: &ts3query_transport::SshCredentials,
    transport_config: &TransportConfig,
    session_config: SessionConfig,
) -> Result<Session> {
    let carrier = ts3query_transport::SshCarrier::connect(addr, credentials, transport_config)?;
    Ok(Session::from_transport(Box::new(carrier), session_config))
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use ts3query_transport::{Carrier, TransportError};

    use super::*;
    use crate::builder::QueryBuilder;
    use crate::error::QueryError;

    #[test]
    fn connect_convenience() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("local addr").to_string();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("listener should accept");
            let mut writer = stream.try_clone().expect("clone stream");
            writer
                .write_all(b"TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface\n\r")
                .expect("greeting");

            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            reader.read_until(b'\r', &mut line).expect("command");
            writer
                .write_all(b"virtualserver_status=unknown client_id=1\n\rerror id=0 msg=ok\n\r")
                .expect("response");
            line
        });

        let session = connect(&addr).expect("client should connect");
        assert_eq!(session.carrier(), Carrier::Tcp);
        assert_eq!(session.peer_host(), Some("127.0.0.1"));

        let response = session
            .execute(&QueryBuilder::new("whoami"))
            .expect("whoami should succeed");
        assert_eq!(
            response.first().and_then(|r| r.get("client_id")),
            Some("1")
        );

        assert_eq!(server.join().expect("server thread"), b"whoami\n\r");
    }

    #[test]
    fn connect_refused_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        drop(listener);

        let config = TransportConfig {
            connect_timeout: Duration::from_millis(500),
            ..TransportConfig::default()
        };
        let err = connect_with_config(&addr, &config, SessionConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Transport(TransportError::Connect { .. })
        ));
    }
}
