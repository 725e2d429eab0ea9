//! Scripted in-memory transport for exercising mount logic without hardware.

use std::collections::VecDeque;
use std::io;

use super::error::{MountError, MountResult};
use super::transport::LineTransport;

enum ScriptedRead {
    Line(String),
    Fail(io::ErrorKind),
}

/// A [`LineTransport`] that replays canned replies and records every write.
///
/// Each [`read_line`](LineTransport::read_line) pops the next scripted entry;
/// an empty string plays the role of a read timeout. Once the script runs out
/// reads fail with `UnexpectedEof`, as if the cable had been pulled, so a
/// loop under test cannot spin forever.
#[derive(Default)]
pub struct ScriptedTransport {
    reads: VecDeque<ScriptedRead>,
    written: Vec<String>,
    fail_writes_after: Option<usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that will answer with `lines`, in order.
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut transport = Self::new();
        for line in lines {
            transport.push_line(line);
        }
        transport
    }

    /// Queue one reply line.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.reads.push_back(ScriptedRead::Line(line.into()));
    }

    /// Queue a read failure of the given kind.
    pub fn push_read_error(&mut self, kind: io::ErrorKind) {
        self.reads.push_back(ScriptedRead::Fail(kind));
    }

    /// Let `count` writes succeed, then fail every write after that.
    pub fn fail_writes_after(&mut self, count: usize) {
        self.fail_writes_after = Some(count);
    }

    /// Every line written so far, newline included.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    /// Written lines that were not `GET_MPU` requests.
    pub fn commands(&self) -> Vec<&str> {
        self.written
            .iter()
            .map(String::as_str)
            .filter(|line| line.trim_end() != super::protocol::GET_MPU)
            .collect()
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.reads.len()
    }
}

impl LineTransport for ScriptedTransport {
    fn write_line(&mut self, line: &str) -> MountResult<()> {
        if self
            .fail_writes_after
            .is_some_and(|limit| self.written.len() >= limit)
        {
            return Err(MountError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }

        let mut msg = line.to_string();
        if !msg.ends_with('\n') {
            msg.push('\n');
        }
        self.written.push(msg);
        Ok(())
    }

    fn read_line(&mut self) -> MountResult<String> {
        match self.reads.pop_front() {
            Some(ScriptedRead::Line(line)) => Ok(line.trim().to_string()),
            Some(ScriptedRead::Fail(kind)) => {
                Err(MountError::Io(io::Error::new(kind, "scripted read failure")))
            }
            None => Err(MountError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "script exhausted",
            ))),
        }
    }
}
