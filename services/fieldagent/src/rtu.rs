//! Half-duplex Modbus RTU exchange (spec.md §4.10, §5): one write then
//! one read per ADU, no concurrency, no retries. Generic over the
//! transport so tests can swap in `tokio::io::duplex` for the real
//! serial port.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crc;
use crate::timing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtuError {
    /// No byte arrived within the first-byte timeout.
    NoReply,
    /// A reply started but went silent before the frame was even long
    /// enough to carry a CRC.
    Truncated,
    /// The reply's CRC-16 didn't check out.
    CrcMismatch,
    Io,
}

/// UART byte shape, used to derive the inter-symbol silence.
#[derive(Debug, Clone, Copy)]
pub struct LineConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub parity_bit: bool,
    pub stop_bits: u8,
}

impl LineConfig {
    fn inter_symbol_gap(&self) -> Duration {
        timing::inter_symbol_timeout(self.baud, self.data_bits, self.parity_bit, self.stop_bits)
    }
}

/// Send one CRC-framed ADU and read back the reply, stripping its CRC.
///
/// `pdu` is the request ADU without its CRC; this function appends it.
/// On success, returns the reply bytes with the trailing CRC removed.
pub async fn exchange<T>(io: &mut T, pdu: &[u8], line: LineConfig) -> Result<Vec<u8>, RtuError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = pdu.to_vec();
    crc::append(&mut frame);

    io.write_all(&frame).await.map_err(|_| RtuError::Io)?;
    io.flush().await.map_err(|_| RtuError::Io)?;

    let reply = read_frame(io, line).await?;
    if !crc::frame_is_valid(&reply) {
        return Err(RtuError::CrcMismatch);
    }
    Ok(reply[..reply.len() - 2].to_vec())
}

/// Read a reply with the two-stage timeout from spec.md §4.10: wait
/// `T_first` for the first byte, then stop as soon as `T_intersymbol`
/// elapses with no further byte.
async fn read_frame<T>(io: &mut T, line: LineConfig) -> Result<Vec<u8>, RtuError>
where
    T: AsyncRead + Unpin,
{
    let mut buf = [0u8; 256];
    let mut frame = Vec::new();

    let first = tokio::time::timeout(timing::FIRST_BYTE_TIMEOUT, io.read(&mut buf))
        .await
        .map_err(|_| RtuError::NoReply)?
        .map_err(|_| RtuError::Io)?;
    if first == 0 {
        return Err(RtuError::NoReply);
    }
    frame.extend_from_slice(&buf[..first]);

    let gap = line.inter_symbol_gap();
    loop {
        match tokio::time::timeout(gap, io.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => frame.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => return Err(RtuError::Io),
            Err(_elapsed) => break,
        }
    }

    if frame.len() < 2 {
        return Err(RtuError::Truncated);
    }
    Ok(frame)
}
