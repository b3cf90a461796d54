//! Wire protocol: typed station messages over length-prefixed frames.
//!
//! Stations speak a small binary protocol: a `u32` payload length, a `u16`
//! message type, then the payload as packed little-endian `u32` fields.
//! The sentinel [`NO_ID`] stands for "no order" / "no next station".

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{MesError, MesResult};

/// A tray has arrived at a station and asks what to do.
pub const MSG_STATION_ACTION_QUERY: u16 = 0x1046;
/// A tray has finished the local process and asks what to do next.
pub const MSG_STATION_ACTION_DONE_QUERY: u16 = 0x1047;
/// The dispatch decision sent back for either query.
pub const MSG_STATION_ACTION_RSP: u16 = 0x1048;

/// Sentinel id: no order assigned / no next station.
pub const NO_ID: u32 = u32::MAX;

/// Upper bound on accepted payload sizes; anything larger is a protocol
/// violation, not a real station message.
const MAX_PAYLOAD: u32 = 64 * 1024;

/// The two dispatch decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Move on; `next_station_id` says where
    Release = 0,
    /// Run the local process; `next_station_id` is meaningless
    Execute = 1,
}

impl ActionType {
    pub fn from_wire(value: u32) -> MesResult<Self> {
        match value {
            0 => Ok(ActionType::Release),
            1 => Ok(ActionType::Execute),
            other => Err(MesError::Protocol(format!("unknown action type {other}"))),
        }
    }

    pub fn to_wire(self) -> u32 {
        self as u32
    }
}

/// Payload of both query types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionQuery {
    pub workstation_id: u32,
    pub tray_id: u32,
}

impl ActionQuery {
    pub const WIRE_LEN: usize = 8;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        buf.extend_from_slice(&self.workstation_id.to_le_bytes());
        buf.extend_from_slice(&self.tray_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> MesResult<Self> {
        if bytes.len() < Self::WIRE_LEN {
            return Err(MesError::Protocol(format!(
                "action query payload is {} bytes, expected {}",
                bytes.len(),
                Self::WIRE_LEN
            )));
        }
        Ok(Self {
            workstation_id: read_u32(bytes, 0),
            tray_id: read_u32(bytes, 4),
        })
    }
}

/// Payload of the action response: the echoed query plus the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRsp {
    pub qry: ActionQuery,
    pub order_id: u32,
    pub action_type: ActionType,
    pub next_station_id: u32,
}

impl ActionRsp {
    pub const WIRE_LEN: usize = ActionQuery::WIRE_LEN + 12;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.qry.to_bytes();
        buf.extend_from_slice(&self.order_id.to_le_bytes());
        buf.extend_from_slice(&self.action_type.to_wire().to_le_bytes());
        buf.extend_from_slice(&self.next_station_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> MesResult<Self> {
        if bytes.len() < Self::WIRE_LEN {
            return Err(MesError::Protocol(format!(
                "action response payload is {} bytes, expected {}",
                bytes.len(),
                Self::WIRE_LEN
            )));
        }
        Ok(Self {
            qry: ActionQuery::from_bytes(bytes)?,
            order_id: read_u32(bytes, 8),
            action_type: ActionType::from_wire(read_u32(bytes, 12))?,
            next_station_id: read_u32(bytes, 16),
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

/// Read one frame. `Ok(None)` when the peer closed the connection cleanly
/// at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> MesResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_PAYLOAD {
        return Err(MesError::Protocol(format!("oversized frame ({len} bytes)")));
    }
    let mut type_buf = [0u8; 2];
    reader.read_exact(&mut type_buf).await?;
    let msg_type = u16::from_le_bytes(type_buf);
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame { msg_type, payload }))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> MesResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&(frame.payload.len() as u32).to_le_bytes())
        .await?;
    writer.write_all(&frame.msg_type.to_le_bytes()).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_round_trip() {
        let qry = ActionQuery {
            workstation_id: 3,
            tray_id: 7,
        };
        let bytes = qry.to_bytes();
        assert_eq!(bytes.len(), ActionQuery::WIRE_LEN);
        assert_eq!(ActionQuery::from_bytes(&bytes).unwrap(), qry);
    }

    #[test]
    fn test_rsp_round_trip() {
        let rsp = ActionRsp {
            qry: ActionQuery {
                workstation_id: 3,
                tray_id: 7,
            },
            order_id: 42,
            action_type: ActionType::Execute,
            next_station_id: NO_ID,
        };
        let bytes = rsp.to_bytes();
        assert_eq!(bytes.len(), ActionRsp::WIRE_LEN);
        assert_eq!(ActionRsp::from_bytes(&bytes).unwrap(), rsp);
    }

    #[test]
    fn test_short_payload_rejected() {
        assert!(ActionQuery::from_bytes(&[0u8; 4]).is_err());
        assert!(ActionRsp::from_bytes(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_bad_action_type_rejected() {
        let mut bytes = ActionRsp {
            qry: ActionQuery {
                workstation_id: 1,
                tray_id: 2,
            },
            order_id: 3,
            action_type: ActionType::Release,
            next_station_id: 4,
        }
        .to_bytes();
        bytes[12] = 9;
        assert!(matches!(
            ActionRsp::from_bytes(&bytes),
            Err(MesError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let frame = Frame {
            msg_type: MSG_STATION_ACTION_QUERY,
            payload: ActionQuery {
                workstation_id: 1,
                tray_id: 7,
            }
            .to_bytes(),
        };
        write_frame(&mut client, &frame).await.unwrap();
        let read = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(read, frame);
    }

    #[tokio::test]
    async fn test_clean_close_yields_none() {
        let (client, mut server) = tokio::io::duplex(256);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client
            .write_all(&(MAX_PAYLOAD + 1).to_le_bytes())
            .await
            .unwrap();
        client.write_all(&[0u8; 2]).await.unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(MesError::Protocol(_))
        ));
    }
}
