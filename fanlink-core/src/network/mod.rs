mod connection;

pub use connection::{
    ConnectionConfig, ConnectionInfo, Connector, DEFAULT_PORT, FanConnection, FanEvent,
    TcpConnector, probe,
};
