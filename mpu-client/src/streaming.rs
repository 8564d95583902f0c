//! Independent byte-range readers over the source file

use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project::pin_project;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf, Take};
use mpu_core::{ByteStream, PartDescriptor};

/// Size of the frames a [`RangeReader`] yields
pub const DEFAULT_FRAME_SIZE: usize = 256 * 1024;

/// Stream of one part's bytes.
///
/// Every reader opens its own file handle, so concurrent parts never share
/// a cursor.
#[pin_project]
pub struct RangeReader {
    #[pin]
    inner: Take<File>,
    buf: BytesMut,
    remaining: u64,
    frame_size: usize,
}

impl RangeReader {
    /// Open `path` positioned at the descriptor's offset
    pub async fn open(path: impl AsRef<Path>, descriptor: &PartDescriptor) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(descriptor.byte_offset)).await?;

        Ok(RangeReader {
            inner: file.take(descriptor.byte_length),
            buf: BytesMut::new(),
            remaining: descriptor.byte_length,
            frame_size: DEFAULT_FRAME_SIZE,
        })
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    /// Bytes not yet yielded
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_stream(self) -> ByteStream {
        Box::pin(self)
    }
}

impl Stream for RangeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.remaining == 0 {
            return Poll::Ready(None);
        }

        let want = (*this.remaining).min(*this.frame_size as u64) as usize;
        this.buf.resize(want, 0);

        let mut read_buf = ReadBuf::new(&mut this.buf[..want]);
        match this.inner.poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Ok(())) => {
                let n = read_buf.filled().len();
                if n == 0 {
                    *this.remaining = 0;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file ended inside part range",
                    ))));
                }
                *this.remaining -= n as u64;
                Poll::Ready(Some(Ok(this.buf.split_to(n).freeze())))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let frames = self.remaining.div_ceil(self.frame_size as u64) as usize;
        (0, Some(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    fn fixture(len: usize) -> (tempfile::NamedTempFile, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        (file, data)
    }

    async fn collect(reader: RangeReader) -> io::Result<Vec<u8>> {
        let mut stream = reader.into_stream();
        let mut out = Vec::new();
        while let Some(frame) = stream.next().await {
            out.extend_from_slice(&frame?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_reads_exact_range() {
        let (file, data) = fixture(10_000);
        let descriptor = PartDescriptor {
            part_number: 2,
            byte_offset: 4096,
            byte_length: 3000,
        };

        let reader = RangeReader::open(file.path(), &descriptor)
            .await
            .unwrap()
            .with_frame_size(700);
        assert_eq!(reader.remaining(), 3000);

        let bytes = collect(reader).await.unwrap();
        assert_eq!(bytes, &data[4096..7096]);
    }

    #[tokio::test]
    async fn test_independent_readers_do_not_share_position() {
        let (file, data) = fixture(4096);
        let first = PartDescriptor { part_number: 1, byte_offset: 0, byte_length: 2048 };
        let second = PartDescriptor { part_number: 2, byte_offset: 2048, byte_length: 2048 };

        let a = RangeReader::open(file.path(), &first).await.unwrap().with_frame_size(100);
        let b = RangeReader::open(file.path(), &second).await.unwrap().with_frame_size(100);

        let (a, b) = tokio::join!(collect(a), collect(b));
        assert_eq!(a.unwrap(), &data[..2048]);
        assert_eq!(b.unwrap(), &data[2048..]);
    }

    #[tokio::test]
    async fn test_truncated_file_is_an_error() {
        let (file, _) = fixture(100);
        let descriptor = PartDescriptor { part_number: 1, byte_offset: 50, byte_length: 100 };

        let reader = RangeReader::open(file.path(), &descriptor).await.unwrap();
        let err = collect(reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
