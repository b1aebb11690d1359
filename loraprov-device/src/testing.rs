//! In-memory transport for exercising the command protocol without hardware.

use std::collections::VecDeque;
use std::io;

use crate::transport::Transport;

/// What the simulated device does in response to one frame.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Emit these bytes
    Bytes(Vec<u8>),
    /// Stay silent, every read times out
    Silence,
    /// Fail the write at the I/O level
    WriteError,
}

/// A [`Transport`] that answers each sent frame with the next scripted reply.
///
/// Once the script runs out the device stays silent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: VecDeque<Reply>,
    pending: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Queue `count` silent replies.
    pub fn silent(mut self, count: usize) -> Self {
        self.replies.extend(std::iter::repeat_n(Reply::Silence, count));
        self
    }

    pub fn then(mut self, reply: Reply) -> Self {
        self.replies.push_back(reply);
        self
    }

    /// Bytes left over in the input buffer, as if the device printed a
    /// boot banner before the first command.
    pub fn with_noise(mut self, noise: &[u8]) -> Self {
        self.pending.extend(noise);
        self
    }

    /// Every frame written so far, in order.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }
}

impl Transport for ScriptedTransport {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.sent.push(frame.to_vec());
        match self.replies.pop_front().unwrap_or(Reply::Silence) {
            Reply::Bytes(bytes) => self.pending.extend(bytes),
            Reply::Silence => {}
            Reply::WriteError => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}
