//! Minimal MQTT 3.1.1 broker speaking just enough of the protocol over
//! plain TCP to drive a real `rumqttc` event loop in tests.

use std::net::SocketAddr;
use std::time::Duration;

use rumqttc::MqttOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Packets a client may send, reduced to what tests assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Connect,
    Subscribe { pkid: u16, filters: Vec<String> },
    PubAck(u16),
    PingReq,
    Disconnect,
    Other(u8),
}

pub struct FakeBroker {
    listener: TcpListener,
    addr: SocketAddr,
}

impl FakeBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self { listener, addr }
    }

    /// Client options pointing at this broker over plain TCP with a
    /// persistent session.
    pub fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.addr.ip().to_string(), self.addr.port());
        options
            .set_keep_alive(Duration::from_secs(30))
            .set_clean_session(false);
        options
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn accept(&self) -> BrokerSession {
        let (stream, _) = self.listener.accept().await.unwrap();
        BrokerSession { stream }
    }
}

/// One accepted client connection.
pub struct BrokerSession {
    stream: TcpStream,
}

impl BrokerSession {
    /// Returns `None` once the client closes the socket.
    pub async fn read_packet(&mut self) -> Option<ClientPacket> {
        let header = self.stream.read_u8().await.ok()?;

        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let byte = self.stream.read_u8().await.ok()?;
            remaining |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0u8; remaining];
        self.stream.read_exact(&mut body).await.ok()?;

        let packet = match header >> 4 {
            1 => ClientPacket::Connect,
            4 => ClientPacket::PubAck(u16::from_be_bytes([body[0], body[1]])),
            8 => {
                let pkid = u16::from_be_bytes([body[0], body[1]]);
                let mut filters = Vec::new();
                let mut at = 2;
                while at < body.len() {
                    let len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
                    at += 2;
                    filters.push(String::from_utf8_lossy(&body[at..at + len]).into_owned());
                    // skip the requested qos byte
                    at += len + 1;
                }
                ClientPacket::Subscribe { pkid, filters }
            }
            12 => ClientPacket::PingReq,
            14 => ClientPacket::Disconnect,
            other => ClientPacket::Other(other),
        };
        Some(packet)
    }

    /// Reads until a packet other than PINGREQ shows up.
    pub async fn expect_packet(&mut self) -> ClientPacket {
        loop {
            match self.read_packet().await {
                Some(ClientPacket::PingReq) => self.send(&[0xd0, 0x00]).await,
                Some(packet) => return packet,
                None => panic!("client closed the connection"),
            }
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }
}

pub fn connack(session_present: bool) -> Vec<u8> {
    vec![0x20, 0x02, u8::from(session_present), 0x00]
}

/// Grants every filter at QoS 1.
pub fn suback(pkid: u16, filters: usize) -> Vec<u8> {
    let mut packet = vec![0x90];
    encode_length(&mut packet, 2 + filters);
    packet.extend_from_slice(&pkid.to_be_bytes());
    packet.extend(std::iter::repeat_n(0x01, filters));
    packet
}

pub fn publish_qos1(pkid: u16, topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x32];
    encode_length(&mut packet, 2 + topic.len() + 2 + payload.len());
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(&pkid.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

fn encode_length(packet: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if len == 0 {
            break;
        }
    }
}
