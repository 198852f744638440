use crate::comms::error::BusError;
use crate::comms::transport::{Frame, SendOutcome, TransportInput, TransportOutput};
use crate::config::BusConfig;
use std::time::Duration;
use zmq::{Context as ZmqContext, Socket, SocketType};

/// ZMQ PUB socket bound to the bus endpoint.
///
/// Sends never block. Once a subscriber's queue reaches the send high-water
/// mark, ZMQ discards further messages for that subscriber.
pub struct ZmqPublisher {
    socket: Socket,
}

impl ZmqPublisher {
    pub fn bind(context: &ZmqContext, config: &BusConfig) -> Result<Self, BusError> {
        let socket = context.socket(SocketType::PUB)?;
        socket.set_sndhwm(config.send_high_water_mark)?;
        socket.set_linger(config.linger_ms)?;
        socket.bind(&config.endpoint).map_err(|source| BusError::Bind {
            endpoint: config.endpoint.clone(),
            source,
        })?;
        Ok(Self { socket })
    }
}

impl TransportOutput for ZmqPublisher {
    fn send_frame(&mut self, topic: &str, body: &[u8]) -> Result<SendOutcome, BusError> {
        match self
            .socket
            .send_multipart([topic.as_bytes(), body], zmq::DONTWAIT)
        {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(zmq::Error::EAGAIN) => Ok(SendOutcome::Dropped),
            Err(e) => Err(BusError::Zmq(e)),
        }
    }
}

/// ZMQ SUB socket connected to the bus endpoint.
///
/// ZMQ reconnects on its own with an exponential interval, so a publisher
/// restart is transparent to the subscriber.
pub struct ZmqSubscriber {
    socket: Socket,
}

impl ZmqSubscriber {
    pub fn connect(
        context: &ZmqContext,
        config: &BusConfig,
        topics: &[&str],
    ) -> Result<Self, BusError> {
        let socket = context.socket(SocketType::SUB)?;
        socket.set_rcvhwm(config.receive_high_water_mark)?;
        socket.set_reconnect_ivl(config.reconnect_interval_ms)?;
        socket.set_reconnect_ivl_max(config.reconnect_interval_max_ms)?;
        socket.set_linger(0)?;
        for topic in topics {
            socket.set_subscribe(topic.as_bytes())?;
        }
        socket
            .connect(&config.endpoint)
            .map_err(|source| BusError::Connect {
                endpoint: config.endpoint.clone(),
                source,
            })?;
        Ok(Self { socket })
    }

    fn read_frame(&self) -> Result<Option<Frame>, BusError> {
        let mut parts = match self.socket.recv_multipart(zmq::DONTWAIT) {
            Ok(parts) => parts,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(zmq::Error::ETERM) => return Err(BusError::Disconnected),
            Err(e) => return Err(BusError::Zmq(e)),
        };
        if parts.len() != 2 {
            return Err(BusError::MalformedFrame(parts.len()));
        }
        let body = parts.pop().unwrap_or_default();
        let topic = parts.pop().unwrap_or_default();
        let topic = String::from_utf8(topic)
            .map_err(|e| BusError::UnknownTopic(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        Ok(Some(Frame { topic, body }))
    }
}

impl TransportInput for ZmqSubscriber {
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, BusError> {
        let ready = match self.socket.poll(zmq::POLLIN, timeout.as_millis() as i64) {
            Ok(ready) => ready,
            Err(zmq::Error::EINTR) => return Ok(None),
            Err(zmq::Error::ETERM) => return Err(BusError::Disconnected),
            Err(e) => return Err(BusError::Zmq(e)),
        };
        if ready == 0 {
            return Ok(None);
        }
        self.read_frame()
    }

    fn try_recv_frame(&mut self) -> Result<Option<Frame>, BusError> {
        self.read_frame()
    }
}
