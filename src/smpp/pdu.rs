//! SMPP 3.4 PDU model and framing.
//!
//! Every PDU starts with a 16-byte header of four big-endian `u32`s:
//! `command_length` (including the header), `command_id`, `command_status`
//! and `sequence_number`. [`PduCodec`] splits a byte stream into [`Pdu`]s and
//! serializes them back.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::sms::decode_short_message;

pub const HEADER_LEN: usize = 16;

/// Default upper bound for `command_length`.
pub const DEFAULT_MAX_PDU_LEN: usize = 64 * 1024;

/// `message_payload` TLV, used when `short_message` is empty.
pub const TAG_MESSAGE_PAYLOAD: u16 = 0x0424;

/// `esm_class` bit marking a delivery receipt.
pub const ESM_CLASS_DELIVERY_RECEIPT: u8 = 0x04;

/// Response bit of `command_id`.
const RESPONSE_BIT: u32 = 0x8000_0000;

pub mod command_id {
    pub const GENERIC_NACK: u32 = 0x8000_0000;
    pub const BIND_RECEIVER: u32 = 0x0000_0001;
    pub const BIND_RECEIVER_RESP: u32 = 0x8000_0001;
    pub const BIND_TRANSMITTER: u32 = 0x0000_0002;
    pub const BIND_TRANSMITTER_RESP: u32 = 0x8000_0002;
    pub const SUBMIT_SM: u32 = 0x0000_0004;
    pub const SUBMIT_SM_RESP: u32 = 0x8000_0004;
    pub const DELIVER_SM: u32 = 0x0000_0005;
    pub const DELIVER_SM_RESP: u32 = 0x8000_0005;
    pub const UNBIND: u32 = 0x0000_0006;
    pub const UNBIND_RESP: u32 = 0x8000_0006;
    pub const BIND_TRANSCEIVER: u32 = 0x0000_0009;
    pub const BIND_TRANSCEIVER_RESP: u32 = 0x8000_0009;
    pub const ENQUIRE_LINK: u32 = 0x0000_0015;
    pub const ENQUIRE_LINK_RESP: u32 = 0x8000_0015;
}

/// `command_status` value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SmppStatus(pub u32);

impl SmppStatus {
    pub const ESME_ROK: SmppStatus = SmppStatus(0x00);
    pub const ESME_RINVCMDLEN: SmppStatus = SmppStatus(0x02);
    pub const ESME_RINVCMDID: SmppStatus = SmppStatus(0x03);
    pub const ESME_RINVBNDSTS: SmppStatus = SmppStatus(0x04);
    pub const ESME_RSYSERR: SmppStatus = SmppStatus(0x08);
    pub const ESME_RINVDSTADR: SmppStatus = SmppStatus(0x0B);
    pub const ESME_RBINDFAIL: SmppStatus = SmppStatus(0x0D);
    pub const ESME_RINVPASWD: SmppStatus = SmppStatus(0x0E);
    pub const ESME_RINVSYSID: SmppStatus = SmppStatus(0x0F);
    pub const ESME_RINVSENDERID: SmppStatus = SmppStatus(0x45);

    pub fn is_ok(self) -> bool {
        self == Self::ESME_ROK
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::ESME_ROK => "ESME_ROK",
            Self::ESME_RINVCMDLEN => "ESME_RINVCMDLEN",
            Self::ESME_RINVCMDID => "ESME_RINVCMDID",
            Self::ESME_RINVBNDSTS => "ESME_RINVBNDSTS",
            Self::ESME_RSYSERR => "ESME_RSYSERR",
            Self::ESME_RINVDSTADR => "ESME_RINVDSTADR",
            Self::ESME_RBINDFAIL => "ESME_RBINDFAIL",
            Self::ESME_RINVPASWD => "ESME_RINVPASWD",
            Self::ESME_RINVSYSID => "ESME_RINVSYSID",
            Self::ESME_RINVSENDERID => "ESME_RINVSENDERID",
            _ => return None,
        })
    }
}

impl fmt::Debug for SmppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}(0x{:02X})", self.0),
            None => write!(f, "SmppStatus(0x{:08X})", self.0),
        }
    }
}

impl fmt::Display for SmppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PduError {
    #[error("Invalid command_length {0}")]
    InvalidLength(usize),

    #[error("Malformed PDU 0x{command_id:08X} (sequence {sequence_number}): {reason}")]
    Malformed {
        command_id: u32,
        sequence_number: u32,
        reason: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PduError {
    /// Status to report in a `generic_nack` for this error.
    pub fn status(&self) -> SmppStatus {
        match self {
            PduError::InvalidLength(_) | PduError::Malformed { .. } => SmppStatus::ESME_RINVCMDLEN,
            PduError::Io(_) => SmppStatus::ESME_RSYSERR,
        }
    }

    pub fn sequence_number(&self) -> u32 {
        match self {
            PduError::Malformed {
                sequence_number, ..
            } => *sequence_number,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    Receiver,
    Transmitter,
    Transceiver,
}

impl BindKind {
    fn request_id(self) -> u32 {
        match self {
            BindKind::Receiver => command_id::BIND_RECEIVER,
            BindKind::Transmitter => command_id::BIND_TRANSMITTER,
            BindKind::Transceiver => command_id::BIND_TRANSCEIVER,
        }
    }

    fn from_command_id(id: u32) -> Option<Self> {
        match id & !RESPONSE_BIT {
            command_id::BIND_RECEIVER => Some(BindKind::Receiver),
            command_id::BIND_TRANSMITTER => Some(BindKind::Transmitter),
            command_id::BIND_TRANSCEIVER => Some(BindKind::Transceiver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bind {
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub interface_version: u8,
    pub addr_ton: u8,
    pub addr_npi: u8,
    pub address_range: String,
}

/// Optional parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u16,
    pub value: Bytes,
}

/// Body shared by `submit_sm` and `deliver_sm`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShortMessage {
    pub service_type: String,
    pub source_addr_ton: u8,
    pub source_addr_npi: u8,
    pub source_addr: String,
    pub dest_addr_ton: u8,
    pub dest_addr_npi: u8,
    pub destination_addr: String,
    pub esm_class: u8,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: u8,
    pub sm_default_msg_id: u8,
    pub short_message: Bytes,
    pub tlvs: Vec<Tlv>,
}

impl ShortMessage {
    /// Message bytes: `short_message`, or the `message_payload` TLV when empty.
    pub fn payload(&self) -> &[u8] {
        if !self.short_message.is_empty() {
            return &self.short_message;
        }
        self.tlvs
            .iter()
            .find(|tlv| tlv.tag == TAG_MESSAGE_PAYLOAD)
            .map(|tlv| tlv.value.as_ref())
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        decode_short_message(self.payload(), self.data_coding)
    }

    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class & ESM_CLASS_DELIVERY_RECEIPT != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduBody {
    Bind(BindKind, Bind),
    BindResp { kind: BindKind, system_id: String },
    SubmitSm(ShortMessage),
    SubmitSmResp { message_id: String },
    DeliverSm(ShortMessage),
    DeliverSmResp { message_id: String },
    Unbind,
    UnbindResp,
    EnquireLink,
    EnquireLinkResp,
    GenericNack,
    /// A command this codec does not model. The body is kept as is.
    Unknown { command_id: u32, body: Bytes },
}

impl PduBody {
    pub fn command_id(&self) -> u32 {
        match self {
            PduBody::Bind(kind, _) => kind.request_id(),
            PduBody::BindResp { kind, .. } => kind.request_id() | RESPONSE_BIT,
            PduBody::SubmitSm(_) => command_id::SUBMIT_SM,
            PduBody::SubmitSmResp { .. } => command_id::SUBMIT_SM_RESP,
            PduBody::DeliverSm(_) => command_id::DELIVER_SM,
            PduBody::DeliverSmResp { .. } => command_id::DELIVER_SM_RESP,
            PduBody::Unbind => command_id::UNBIND,
            PduBody::UnbindResp => command_id::UNBIND_RESP,
            PduBody::EnquireLink => command_id::ENQUIRE_LINK,
            PduBody::EnquireLinkResp => command_id::ENQUIRE_LINK_RESP,
            PduBody::GenericNack => command_id::GENERIC_NACK,
            PduBody::Unknown { command_id, .. } => *command_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PduBody::Bind(BindKind::Receiver, _) => "bind_receiver",
            PduBody::Bind(BindKind::Transmitter, _) => "bind_transmitter",
            PduBody::Bind(BindKind::Transceiver, _) => "bind_transceiver",
            PduBody::BindResp {
                kind: BindKind::Receiver,
                ..
            } => "bind_receiver_resp",
            PduBody::BindResp {
                kind: BindKind::Transmitter,
                ..
            } => "bind_transmitter_resp",
            PduBody::BindResp {
                kind: BindKind::Transceiver,
                ..
            } => "bind_transceiver_resp",
            PduBody::SubmitSm(_) => "submit_sm",
            PduBody::SubmitSmResp { .. } => "submit_sm_resp",
            PduBody::DeliverSm(_) => "deliver_sm",
            PduBody::DeliverSmResp { .. } => "deliver_sm_resp",
            PduBody::Unbind => "unbind",
            PduBody::UnbindResp => "unbind_resp",
            PduBody::EnquireLink => "enquire_link",
            PduBody::EnquireLinkResp => "enquire_link_resp",
            PduBody::GenericNack => "generic_nack",
            PduBody::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub command_status: SmppStatus,
    pub sequence_number: u32,
    pub body: PduBody,
}

impl Pdu {
    /// A request (status 0).
    pub fn request(sequence_number: u32, body: PduBody) -> Self {
        Self {
            command_status: SmppStatus::ESME_ROK,
            sequence_number,
            body,
        }
    }

    /// A response to `self` carrying the same sequence number.
    pub fn respond(&self, command_status: SmppStatus, body: PduBody) -> Self {
        Self {
            command_status,
            sequence_number: self.sequence_number,
            body,
        }
    }

    pub fn generic_nack(sequence_number: u32, status: SmppStatus) -> Self {
        Self {
            command_status: status,
            sequence_number,
            body: PduBody::GenericNack,
        }
    }

    pub fn command_id(&self) -> u32 {
        self.body.command_id()
    }

    /// Parse one complete frame, header included.
    pub fn parse(mut frame: Bytes) -> Result<Self, PduError> {
        if frame.len() < HEADER_LEN {
            return Err(PduError::InvalidLength(frame.len()));
        }
        let _command_length = frame.get_u32();
        let command_id = frame.get_u32();
        let command_status = SmppStatus(frame.get_u32());
        let sequence_number = frame.get_u32();

        let mut reader = BodyReader {
            buf: frame,
            command_id,
            sequence_number,
        };

        let body = match command_id {
            command_id::BIND_RECEIVER | command_id::BIND_TRANSMITTER | command_id::BIND_TRANSCEIVER => {
                let kind = BindKind::from_command_id(command_id).ok_or(reader.malformed("bind kind"))?;
                PduBody::Bind(kind, reader.bind()?)
            }
            command_id::BIND_RECEIVER_RESP
            | command_id::BIND_TRANSMITTER_RESP
            | command_id::BIND_TRANSCEIVER_RESP => {
                let kind = BindKind::from_command_id(command_id).ok_or(reader.malformed("bind kind"))?;
                PduBody::BindResp {
                    kind,
                    system_id: reader.optional_c_string()?,
                }
            }
            command_id::SUBMIT_SM => PduBody::SubmitSm(reader.short_message()?),
            command_id::DELIVER_SM => PduBody::DeliverSm(reader.short_message()?),
            command_id::SUBMIT_SM_RESP => PduBody::SubmitSmResp {
                message_id: reader.optional_c_string()?,
            },
            command_id::DELIVER_SM_RESP => PduBody::DeliverSmResp {
                message_id: reader.optional_c_string()?,
            },
            command_id::UNBIND => PduBody::Unbind,
            command_id::UNBIND_RESP => PduBody::UnbindResp,
            command_id::ENQUIRE_LINK => PduBody::EnquireLink,
            command_id::ENQUIRE_LINK_RESP => PduBody::EnquireLinkResp,
            command_id::GENERIC_NACK => PduBody::GenericNack,
            other => PduBody::Unknown {
                command_id: other,
                body: reader.buf.split_off(0),
            },
        };

        Ok(Self {
            command_status,
            sequence_number,
            body,
        })
    }

    /// Append the encoded PDU to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.put_u32(0);
        dst.put_u32(self.command_id());
        dst.put_u32(self.command_status.0);
        dst.put_u32(self.sequence_number);

        match &self.body {
            PduBody::Bind(_, bind) => {
                put_c_string(dst, &bind.system_id);
                put_c_string(dst, &bind.password);
                put_c_string(dst, &bind.system_type);
                dst.put_u8(bind.interface_version);
                dst.put_u8(bind.addr_ton);
                dst.put_u8(bind.addr_npi);
                put_c_string(dst, &bind.address_range);
            }
            PduBody::BindResp { system_id, .. } => put_c_string(dst, system_id),
            PduBody::SubmitSm(sm) | PduBody::DeliverSm(sm) => put_short_message(dst, sm),
            PduBody::SubmitSmResp { message_id } | PduBody::DeliverSmResp { message_id } => {
                put_c_string(dst, message_id)
            }
            PduBody::Unbind
            | PduBody::UnbindResp
            | PduBody::EnquireLink
            | PduBody::EnquireLinkResp
            | PduBody::GenericNack => {}
            PduBody::Unknown { body, .. } => dst.put_slice(body),
        }

        let len = (dst.len() - start) as u32;
        dst[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.write_to(&mut buf);
        buf.freeze()
    }
}

struct BodyReader {
    buf: Bytes,
    command_id: u32,
    sequence_number: u32,
}

impl BodyReader {
    fn malformed(&self, reason: &'static str) -> PduError {
        PduError::Malformed {
            command_id: self.command_id,
            sequence_number: self.sequence_number,
            reason,
        }
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, PduError> {
        if !self.buf.has_remaining() {
            return Err(self.malformed(field));
        }
        Ok(self.buf.get_u8())
    }

    /// NUL-terminated string. Non-UTF-8 bytes are replaced.
    fn c_string(&mut self, field: &'static str) -> Result<String, PduError> {
        let Some(end) = self.buf.iter().position(|b| *b == 0) else {
            return Err(self.malformed(field));
        };
        let raw = self.buf.split_to(end);
        self.buf.advance(1);
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Responses with an error status may omit their body entirely.
    fn optional_c_string(&mut self) -> Result<String, PduError> {
        if self.buf.is_empty() {
            return Ok(String::new());
        }
        self.c_string("message_id")
    }

    fn bind(&mut self) -> Result<Bind, PduError> {
        Ok(Bind {
            system_id: self.c_string("system_id")?,
            password: self.c_string("password")?,
            system_type: self.c_string("system_type")?,
            interface_version: self.u8("interface_version")?,
            addr_ton: self.u8("addr_ton")?,
            addr_npi: self.u8("addr_npi")?,
            address_range: self.c_string("address_range")?,
        })
    }

    fn short_message(&mut self) -> Result<ShortMessage, PduError> {
        let mut sm = ShortMessage {
            service_type: self.c_string("service_type")?,
            source_addr_ton: self.u8("source_addr_ton")?,
            source_addr_npi: self.u8("source_addr_npi")?,
            source_addr: self.c_string("source_addr")?,
            dest_addr_ton: self.u8("dest_addr_ton")?,
            dest_addr_npi: self.u8("dest_addr_npi")?,
            destination_addr: self.c_string("destination_addr")?,
            esm_class: self.u8("esm_class")?,
            protocol_id: self.u8("protocol_id")?,
            priority_flag: self.u8("priority_flag")?,
            schedule_delivery_time: self.c_string("schedule_delivery_time")?,
            validity_period: self.c_string("validity_period")?,
            registered_delivery: self.u8("registered_delivery")?,
            replace_if_present_flag: self.u8("replace_if_present_flag")?,
            data_coding: self.u8("data_coding")?,
            sm_default_msg_id: self.u8("sm_default_msg_id")?,
            ..Default::default()
        };

        let sm_length = self.u8("sm_length")? as usize;
        if self.buf.remaining() < sm_length {
            return Err(self.malformed("short_message"));
        }
        sm.short_message = self.buf.split_to(sm_length);

        while self.buf.remaining() >= 4 {
            let tag = self.buf.get_u16();
            let len = self.buf.get_u16() as usize;
            if self.buf.remaining() < len {
                return Err(self.malformed("tlv"));
            }
            sm.tlvs.push(Tlv {
                tag,
                value: self.buf.split_to(len),
            });
        }
        if self.buf.has_remaining() {
            return Err(self.malformed("trailing bytes"));
        }

        Ok(sm)
    }
}

fn put_c_string(dst: &mut BytesMut, value: &str) {
    dst.put_slice(value.as_bytes());
    dst.put_u8(0);
}

fn put_short_message(dst: &mut BytesMut, sm: &ShortMessage) {
    put_c_string(dst, &sm.service_type);
    dst.put_u8(sm.source_addr_ton);
    dst.put_u8(sm.source_addr_npi);
    put_c_string(dst, &sm.source_addr);
    dst.put_u8(sm.dest_addr_ton);
    dst.put_u8(sm.dest_addr_npi);
    put_c_string(dst, &sm.destination_addr);
    dst.put_u8(sm.esm_class);
    dst.put_u8(sm.protocol_id);
    dst.put_u8(sm.priority_flag);
    put_c_string(dst, &sm.schedule_delivery_time);
    put_c_string(dst, &sm.validity_period);
    dst.put_u8(sm.registered_delivery);
    dst.put_u8(sm.replace_if_present_flag);
    dst.put_u8(sm.data_coding);
    dst.put_u8(sm.sm_default_msg_id);
    // Longer texts travel in message_payload.
    let short = sm.short_message.get(..255).unwrap_or(&sm.short_message);
    dst.put_u8(short.len() as u8);
    dst.put_slice(short);
    for tlv in &sm.tlvs {
        dst.put_u16(tlv.tag);
        dst.put_u16(tlv.value.len() as u16);
        dst.put_slice(&tlv.value);
    }
}

/// Length-prefixed SMPP framing for `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct PduCodec {
    max_pdu_len: usize,
}

impl PduCodec {
    pub fn new(max_pdu_len: usize) -> Self {
        Self { max_pdu_len }
    }
}

impl Default for PduCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PDU_LEN)
    }
}

impl Decoder for PduCodec {
    type Item = Pdu;
    type Error = PduError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Pdu>, PduError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if !(HEADER_LEN..=self.max_pdu_len).contains(&len) {
            return Err(PduError::InvalidLength(len));
        }
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }
        Pdu::parse(src.split_to(len).freeze()).map(Some)
    }
}

impl Encoder<Pdu> for PduCodec {
    type Error = PduError;

    fn encode(&mut self, item: Pdu, dst: &mut BytesMut) -> Result<(), PduError> {
        item.write_to(dst);
        Ok(())
    }
}
