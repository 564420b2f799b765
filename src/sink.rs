//! Where finished frames go
//!
//! A sink takes one frame at a time and must not block: if it can't take the frame right now it
//! says so with [`PublishError::NotReady`] and the frame is dropped. Nothing here retries.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    net::{SocketAddr, UdpSocket},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, Timelike, Utc};
use crossbeam_channel::{Sender, TrySendError};
use tracing::info;

use crate::errors::PublishError;

pub trait PublishSink {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Push out anything buffered. Called once when the batch stage stops.
    fn flush(&mut self) -> Result<(), PublishError> {
        Ok(())
    }
}

impl<S: PublishSink + ?Sized> PublishSink for Box<S> {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        (**self).publish(topic, payload)
    }

    fn flush(&mut self) -> Result<(), PublishError> {
        (**self).flush()
    }
}

/// Hands frames to another thread over a bounded channel
pub struct ChannelSink {
    sender: Sender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl PublishSink for ChannelSink {
    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        match self.sender.try_send(payload.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PublishError::NotReady),
            Err(TrySendError::Disconnected(_)) => Err(PublishError::Closed),
        }
    }
}

/// One datagram per frame. The topic is not carried, receivers key on the frame header.
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    pub fn connect(target: SocketAddr) -> io::Result<Self> {
        let bind: SocketAddr = if target.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(target)?;
        socket.set_nonblocking(true)?;
        info!(%target, "UDP sink ready");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PublishSink for UdpSink {
    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        match self.socket.send(payload) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(PublishError::NotReady),
            Err(e) => Err(e.into()),
        }
    }
}

/// Capture-file friendly timestamp
fn file_timestamp(time: &DateTime<Utc>) -> String {
    format!(
        "{}-{:02}-{:02}-{:02}:{:02}:{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

/// Appends raw frames back to back into a `jqmb-<timestamp>.bin` file
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(dir: &Path) -> io::Result<Self> {
        let path = dir.join(format!("jqmb-{}.bin", file_timestamp(&Utc::now())));
        let writer = BufWriter::new(File::create(&path)?);
        info!(path = %path.display(), "Writing frames to file");
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PublishSink for FileSink {
    fn publish(&mut self, _topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.writer.write_all(payload)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PublishError> {
        self.writer.flush()?;
        Ok(())
    }
}
