//! Minimal RESP2 client: enough to probe a server and exercise it in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Largest bulk string accepted from a peer, matching the server's own
/// `proto-max-bulk-len` default.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Upper bound on preallocated array slots; longer arrays grow as read.
const ARRAY_PREALLOC: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

/// Encode a command as an array of bulk strings.
#[must_use]
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        bail!("connection closed");
    }
    if !buf.ends_with(b"\r\n") {
        bail!("malformed line");
    }
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf).context("non utf-8 line")
}

fn parse_len(raw: &str) -> anyhow::Result<Option<usize>> {
    let len: i64 = raw.parse().with_context(|| format!("invalid length '{raw}'"))?;
    if len < 0 {
        return Ok(None);
    }
    usize::try_from(len)
        .map(Some)
        .map_err(|_| anyhow!("length {len} out of range"))
}

/// Read one value. Boxed because arrays recurse.
pub fn read_value<'a, R>(
    reader: &'a mut R,
) -> Pin<Box<dyn Future<Output = anyhow::Result<RespValue>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let Some(kind) = line.chars().next() else {
            bail!("empty reply");
        };
        let rest = &line[kind.len_utf8()..];
        match kind {
            '+' => Ok(RespValue::Simple(rest.to_owned())),
            '-' => Ok(RespValue::Error(rest.to_owned())),
            ':' => Ok(RespValue::Integer(
                rest.parse().with_context(|| format!("invalid integer '{rest}'"))?,
            )),
            '$' => {
                let Some(len) = parse_len(rest)? else {
                    return Ok(RespValue::Bulk(None));
                };
                if len > MAX_BULK_LEN {
                    bail!("bulk length {len} exceeds {MAX_BULK_LEN}");
                }
                let framed = len
                    .checked_add(2)
                    .ok_or_else(|| anyhow!("bulk length {len} out of range"))?;
                let mut data = vec![0; framed];
                reader.read_exact(&mut data).await?;
                if !data.ends_with(b"\r\n") {
                    bail!("bulk string not terminated");
                }
                data.truncate(len);
                Ok(RespValue::Bulk(Some(data)))
            }
            '*' => {
                let Some(len) = parse_len(rest)? else {
                    return Ok(RespValue::Array(None));
                };
                let mut items = Vec::with_capacity(len.min(ARRAY_PREALLOC));
                for _ in 0..len {
                    items.push(read_value(reader).await?);
                }
                Ok(RespValue::Array(Some(items)))
            }
            other => bail!("unknown reply type '{other}'"),
        }
    })
}

pub struct RespConnection {
    stream: BufReader<TcpStream>,
}

impl RespConnection {
    /// # Errors
    /// Connection failures and timeouts.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| anyhow!("connect to {host}:{port} timed out after {timeout:?}"))?
            .with_context(|| format!("cannot connect to {host}:{port}"))?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Send one command and read its reply. Error replies are returned as
    /// values, not as errors.
    ///
    /// # Errors
    /// I/O or protocol failures.
    pub async fn command(&mut self, args: &[&str]) -> anyhow::Result<RespValue> {
        self.stream.get_mut().write_all(&encode_command(args)).await?;
        read_value(&mut self.stream).await
    }

    /// # Errors
    /// Anything but `+PONG` (an auth challenge still proves the server is up).
    pub async fn ping(&mut self) -> anyhow::Result<()> {
        let reply = self.command(&["PING"]).await?;
        let serving = match &reply {
            RespValue::Simple(s) => s == "PONG",
            RespValue::Error(e) => e.starts_with("NOAUTH"),
            _ => false,
        };
        if !serving {
            bail!("unexpected PING reply: {reply:?}");
        }
        Ok(())
    }

    /// # Errors
    /// Error replies and I/O failures.
    pub async fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match self.command(&["SET", key, value]).await? {
            RespValue::Simple(s) if s == "OK" => Ok(()),
            other => bail!("unexpected SET reply: {other:?}"),
        }
    }

    /// # Errors
    /// Error replies, non utf-8 values and I/O failures.
    pub async fn get(&mut self, key: &str) -> anyhow::Result<Option<String>> {
        match self.command(&["GET", key]).await? {
            RespValue::Bulk(None) => Ok(None),
            RespValue::Bulk(Some(data)) => Ok(Some(String::from_utf8(data)?)),
            other => bail!("unexpected GET reply: {other:?}"),
        }
    }
}
