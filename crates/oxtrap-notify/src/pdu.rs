//! BER encoding of SNMPv2c Trap PDUs.
//!
//! Only the subset needed to emit notifications is covered: INTEGER,
//! OCTET STRING, OBJECT IDENTIFIER, TimeTicks and the surrounding
//! SEQUENCE / SNMPv2-Trap-PDU framing.

use chrono::{DateTime, Utc};
use oxtrap_common::types::{TrapPayload, TrapValue};
use oxtrap_common::Oid;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OBJECT_ID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_SNMPV2_TRAP: u8 = 0xA7;

/// Wire value of the `version` field for SNMPv2c.
pub const SNMP_VERSION_2C: i64 = 1;

/// Arc appended to a rule's OID to carry the severity string.
pub const SEVERITY_ARC: u32 = 2;

/// `sysUpTime.0`
pub fn sys_uptime_oid() -> Oid {
    Oid::from_arcs(vec![1, 3, 6, 1, 2, 1, 1, 3, 0])
}

/// `snmpTrapOID.0`
pub fn snmp_trap_oid() -> Oid {
    Oid::from_arcs(vec![1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0])
}

pub fn severity_oid(oid: &Oid) -> Oid {
    oid.child(SEVERITY_ARC)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PduError {
    #[error("OID '{0}' cannot be BER encoded")]
    UnencodableOid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectId(Oid),
    TimeTicks(u32),
}

impl From<&TrapValue> for VarValue {
    fn from(value: &TrapValue) -> Self {
        match value {
            TrapValue::Integer(v) => VarValue::Integer(*v),
            TrapValue::Text(s) => VarValue::OctetString(s.as_bytes().to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: VarValue,
}

/// The rule-specific part of a notification, shared by every receiver a
/// trap is addressed to. Sessions add `sysUpTime.0` and `snmpTrapOID.0`
/// when encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapMessage {
    pub trap_oid: Oid,
    pub varbinds: Vec<VarBind>,
    pub timestamp: DateTime<Utc>,
}

impl TrapMessage {
    pub fn from_payload(payload: &TrapPayload) -> Self {
        let mut varbinds = vec![VarBind {
            oid: payload.oid.clone(),
            value: VarValue::from(&payload.value),
        }];

        if let Some(severity) = payload.severity {
            varbinds.push(VarBind {
                oid: severity_oid(&payload.oid),
                value: VarValue::OctetString(severity.as_str().as_bytes().to_vec()),
            });
        }

        Self {
            trap_oid: payload.oid.clone(),
            varbinds,
            timestamp: payload.timestamp,
        }
    }
}

/// Encodes a complete SNMPv2c message carrying an SNMPv2-Trap-PDU.
pub fn encode_v2c_trap(
    community: &[u8],
    request_id: i32,
    uptime_ticks: u32,
    message: &TrapMessage,
) -> Result<Vec<u8>, PduError> {
    let header = [
        VarBind {
            oid: sys_uptime_oid(),
            value: VarValue::TimeTicks(uptime_ticks),
        },
        VarBind {
            oid: snmp_trap_oid(),
            value: VarValue::ObjectId(message.trap_oid.clone()),
        },
    ];

    let mut varbind_list = Vec::new();
    for varbind in header.iter().chain(message.varbinds.iter()) {
        let mut inner = Vec::new();
        push_tlv(&mut inner, TAG_OBJECT_ID, &oid_content(&varbind.oid)?);
        push_value(&mut inner, &varbind.value)?;
        push_tlv(&mut varbind_list, TAG_SEQUENCE, &inner);
    }

    let mut pdu = Vec::new();
    push_tlv(&mut pdu, TAG_INTEGER, &integer_content(i64::from(request_id)));
    push_tlv(&mut pdu, TAG_INTEGER, &integer_content(0)); // error-status
    push_tlv(&mut pdu, TAG_INTEGER, &integer_content(0)); // error-index
    push_tlv(&mut pdu, TAG_SEQUENCE, &varbind_list);

    let mut body = Vec::new();
    push_tlv(&mut body, TAG_INTEGER, &integer_content(SNMP_VERSION_2C));
    push_tlv(&mut body, TAG_OCTET_STRING, community);
    push_tlv(&mut body, TAG_SNMPV2_TRAP, &pdu);

    let mut out = Vec::with_capacity(body.len() + 4);
    push_tlv(&mut out, TAG_SEQUENCE, &body);
    Ok(out)
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

fn push_value(out: &mut Vec<u8>, value: &VarValue) -> Result<(), PduError> {
    match value {
        VarValue::Integer(v) => push_tlv(out, TAG_INTEGER, &integer_content(*v)),
        VarValue::OctetString(bytes) => push_tlv(out, TAG_OCTET_STRING, bytes),
        VarValue::ObjectId(oid) => push_tlv(out, TAG_OBJECT_ID, &oid_content(oid)?),
        VarValue::TimeTicks(ticks) => {
            push_tlv(out, TAG_TIMETICKS, &integer_content(i64::from(*ticks)))
        }
    }
    Ok(())
}

/// Minimal two's complement big-endian representation.
fn integer_content(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let next_high_bit = bytes[start + 1] & 0x80;
        let redundant = (bytes[start] == 0x00 && next_high_bit == 0)
            || (bytes[start] == 0xFF && next_high_bit != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn push_base128(out: &mut Vec<u8>, value: u64) {
    let mut groups = Vec::new();
    let mut v = value;
    loop {
        groups.push((v & 0x7f) as u8);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for (i, group) in groups.iter().enumerate().rev() {
        out.push(if i == 0 { *group } else { group | 0x80 });
    }
}

fn oid_content(oid: &Oid) -> Result<Vec<u8>, PduError> {
    let arcs = oid.arcs();
    let unencodable = || PduError::UnencodableOid(oid.to_string());

    let (first, second) = match arcs {
        [first, second, ..] => (*first, *second),
        _ => return Err(unencodable()),
    };
    if first > 2 || (first < 2 && second >= 40) {
        return Err(unencodable());
    }

    let mut out = Vec::with_capacity(arcs.len() + 4);
    push_base128(&mut out, u64::from(first) * 40 + u64::from(second));
    for arc in &arcs[2..] {
        push_base128(&mut out, u64::from(*arc));
    }
    Ok(out)
}
