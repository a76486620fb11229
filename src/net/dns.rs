//! Minimal DNS client over a `PacketConn`
//!
//! One query, one answer: enough to tell whether a UDP path carries DNS.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};

use super::transport::PacketConn;
use crate::check::CheckError;

/// Large enough for any non-EDNS UDP response
const MAX_RESPONSE_SIZE: usize = 4096;

/// Encode a recursive query for `host`
pub fn build_query(id: u16, host: &str, qtype: RecordType) -> Result<Vec<u8>, CheckError> {
    let name = Name::from_str(host)
        .map_err(|e| CheckError::BadDnsResponse(format!("invalid name {}: {}", host, e)))?;
    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, qtype));
    msg.to_vec()
        .map_err(|e| CheckError::BadDnsResponse(format!("encode query: {}", e)))
}

/// Decode a response to query `id` and collect its A/AAAA answers
pub fn parse_response(id: u16, buf: &[u8]) -> Result<Vec<IpAddr>, CheckError> {
    let msg = Message::from_vec(buf).map_err(|e| CheckError::BadDnsResponse(e.to_string()))?;
    if msg.id() != id {
        return Err(CheckError::BadDnsResponse(format!(
            "id mismatch: want {}, got {}",
            id,
            msg.id()
        )));
    }
    if msg.response_code() != ResponseCode::NoError {
        return Err(CheckError::BadDnsResponse(msg.response_code().to_string()));
    }
    let addrs = msg
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(Ipv4Addr::from(a.0))),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(Ipv6Addr::from(aaaa.0))),
            _ => None,
        })
        .collect();
    Ok(addrs)
}

/// Ask the server behind `conn` for `qtype` records of `host`
pub async fn resolve(
    conn: &dyn PacketConn,
    host: &str,
    qtype: RecordType,
) -> Result<Vec<IpAddr>, CheckError> {
    let id: u16 = rand::random();
    let query = build_query(id, host, qtype)?;
    conn.send(&query).await?;

    let mut buf = vec![0u8; MAX_RESPONSE_SIZE];
    let n = conn.recv(&mut buf).await?;
    parse_response(id, &buf[..n])
}
