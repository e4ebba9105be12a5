use std::io::IoSlice;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response};

const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Serializes a response with resumable writes.
///
/// Header and payload live in separate buffers and are flushed with a
/// vectored write; a partial write advances offsets so the next step
/// picks up exactly where the socket stalled. File bodies are streamed
/// in chunks after the header, resumed the same way.
pub struct ResponseWriter {
    head: Vec<u8>,
    head_written: usize,
    body: BodyState,
}

enum BodyState {
    Bytes {
        buf: Vec<u8>,
        written: usize,
    },
    File {
        path: PathBuf,
        file: Option<File>,
        remaining: u64,
        chunk: Vec<u8>,
        chunk_written: usize,
    },
}

impl ResponseWriter {
    pub fn new(response: Response, persistent: bool) -> Self {
        let head = response.serialize_head(persistent);
        let body = match response.body {
            Body::Bytes(buf) => BodyState::Bytes { buf, written: 0 },
            Body::File { path, len } => BodyState::File {
                path,
                file: None,
                remaining: len,
                chunk: Vec::new(),
                chunk_written: 0,
            },
        };
        Self {
            head,
            head_written: 0,
            body,
        }
    }

    pub fn done(&self) -> bool {
        if self.head_written < self.head.len() {
            return false;
        }
        match &self.body {
            BodyState::Bytes { buf, written } => *written >= buf.len(),
            BodyState::File {
                remaining,
                chunk,
                chunk_written,
                ..
            } => *remaining == 0 && *chunk_written >= chunk.len(),
        }
    }

    /// Performs one write against the stream and advances internal
    /// offsets. The caller loops until `done`, re-arming timeout
    /// membership around each step.
    pub async fn write_step<S>(&mut self, stream: &mut S) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        if self.head_written < self.head.len() {
            let head_rest = &self.head[self.head_written..];
            let n = match &self.body {
                BodyState::Bytes { buf, written } if *written < buf.len() => {
                    let slices = [IoSlice::new(head_rest), IoSlice::new(&buf[*written..])];
                    stream.write_vectored(&slices).await?
                }
                _ => stream.write(head_rest).await?,
            };
            if n == 0 {
                return Err(std::io::ErrorKind::WriteZero.into());
            }
            let into_head = n.min(head_rest.len());
            self.head_written += into_head;
            if let BodyState::Bytes { written, .. } = &mut self.body {
                *written += n - into_head;
            }
            return Ok(());
        }

        match &mut self.body {
            BodyState::Bytes { buf, written } => {
                if *written < buf.len() {
                    let n = stream.write(&buf[*written..]).await?;
                    if n == 0 {
                        return Err(std::io::ErrorKind::WriteZero.into());
                    }
                    *written += n;
                }
                Ok(())
            }
            BodyState::File {
                path,
                file,
                remaining,
                chunk,
                chunk_written,
            } => {
                if *chunk_written >= chunk.len() {
                    if *remaining == 0 {
                        return Ok(());
                    }
                    let f = match file {
                        Some(f) => f,
                        None => file.insert(File::open(&path).await?),
                    };
                    chunk.resize(FILE_CHUNK_SIZE.min(*remaining as usize), 0);
                    let n = f.read(chunk).await?;
                    if n == 0 {
                        // File shrank underneath us.
                        return Err(std::io::ErrorKind::UnexpectedEof.into());
                    }
                    chunk.truncate(n);
                    *chunk_written = 0;
                    *remaining -= n as u64;
                }
                let n = stream.write(&chunk[*chunk_written..]).await?;
                if n == 0 {
                    return Err(std::io::ErrorKind::WriteZero.into());
                }
                *chunk_written += n;
                Ok(())
            }
        }
    }

    /// Drives write steps to completion. Used where timeout membership
    /// is managed by the caller for the whole write.
    pub async fn write_to_stream<S>(&mut self, stream: &mut S) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        while !self.done() {
            self.write_step(stream).await?;
        }
        Ok(())
    }
}
