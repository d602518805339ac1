use crate::tlv::{self, TlvElement, TlvError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TLV type constants for NDN packets
pub mod tlv_types {
    pub const INTEREST: u8 = 0x05;
    pub const DATA: u8 = 0x06;
    pub const NAME: u8 = 0x07;
    pub const NAME_COMPONENT: u8 = 0x08;
    pub const NONCE: u8 = 0x0A;
    pub const INTEREST_LIFETIME: u8 = 0x0C;
    pub const MUST_BE_FRESH: u8 = 0x12;
    pub const CONTENT: u8 = 0x15;
    pub const SIGNATURE_VALUE: u8 = 0x17;
    pub const FRESHNESS_PERIOD: u8 = 0x19;
    pub const FORWARDING_HINT: u8 = 0x1E;
    pub const CAN_BE_PREFIX: u8 = 0x21;
    pub const HOP_LIMIT: u8 = 0x22;
    pub const APPLICATION_PARAMETERS: u8 = 0x24;
    // Nack framing; single-byte types, see DESIGN.md
    pub const NACK: u8 = 0x32;
    pub const NACK_REASON: u8 = 0x33;
}

/// Interest lifetime assumed when the packet does not carry one
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

/// Stable identifier of a face. 0 is reserved as the invalid id, 254 tags
/// Data served from the content store, and real faces are allocated from
/// [`FaceId::MIN_ALLOCATED`] upwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct FaceId(pub u64);

impl FaceId {
    pub const INVALID: FaceId = FaceId(0);
    /// Sentinel used to tag Data served from the content store
    pub const CONTENT_STORE: FaceId = FaceId(254);
    /// First id handed out to an actual face
    pub const MIN_ALLOCATED: u64 = 256;

    pub fn is_valid(self) -> bool {
        self != FaceId::INVALID
    }
}

impl std::fmt::Display for FaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == FaceId::CONTENT_STORE {
            write!(f, "cs")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Out-of-band per-packet metadata attached by the forwarding pipeline.
/// Never encoded to the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    pub incoming_face_id: Option<FaceId>,
    pub next_hop_face_id: Option<FaceId>,
    pub pit_token: Option<Vec<u8>>,
}

/// A hierarchical NDN name: an ordered sequence of opaque byte components
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Name {
    pub components: Vec<Vec<u8>>,
}

impl Name {
    /// Create a new empty name
    pub fn new() -> Self {
        Self { components: Vec::new() }
    }

    /// Create a name from a URI-style path (e.g. "/hello/world")
    pub fn from_uri(uri: &str) -> Self {
        let mut name = Name::new();
        for component in uri.split('/') {
            if !component.is_empty() {
                name.components.push(component.as_bytes().to_vec());
            }
        }
        name
    }

    /// Append a component to the name
    pub fn append(&mut self, component: Vec<u8>) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Append a string component to the name
    pub fn append_str(&mut self, component: &str) -> &mut Self {
        self.components.push(component.as_bytes().to_vec());
        self
    }

    /// Get the number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the name is empty
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get a component by index
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(|c| c.as_slice())
    }

    /// Check if this name is a prefix of (or equal to) another name
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.len() > other.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// Get a prefix of this name with the specified number of components
    pub fn get_prefix(&self, length: usize) -> Name {
        Name {
            components: self.components.iter().take(length).cloned().collect(),
        }
    }

    /// URI rendering used in logs
    pub fn to_uri(&self) -> String {
        if self.is_empty() {
            return "/".to_string();
        }
        let mut result = String::new();
        for component in &self.components {
            result.push('/');
            for &byte in component {
                match byte {
                    b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                        result.push(byte as char)
                    }
                    _ => result.push_str(&format!("%{:02X}", byte)),
                }
            }
        }
        result
    }

    /// Encode name to TLV format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut components_tlv = Vec::new();
        for component in &self.components {
            let element = TlvElement::new(tlv_types::NAME_COMPONENT, component.clone());
            element.encode_to(&mut components_tlv)?;
        }
        TlvElement::new(tlv_types::NAME, components_tlv).encode()
    }

    /// Decode name from TLV format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (name_element, consumed) = TlvElement::decode(data)?;
        if name_element.type_ != tlv_types::NAME {
            return Err(TlvError::InvalidType(name_element.type_));
        }

        let mut name = Name::new();
        for element in tlv::decode_tlv_sequence(&name_element.value)? {
            if element.type_ != tlv_types::NAME_COMPONENT {
                return Err(TlvError::InvalidType(element.type_));
            }
            name.components.push(element.value);
        }

        Ok((name, consumed))
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Interest packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub nonce: Option<u32>,
    pub interest_lifetime: Option<Duration>,
    pub hop_limit: Option<u8>,
    pub forwarding_hint: Vec<Name>,
    pub application_parameters: Option<Vec<u8>>,
    #[serde(skip)]
    pub tags: TagMap,
}

impl Interest {
    /// Create a new Interest with the given name
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            nonce: None,
            interest_lifetime: None,
            hop_limit: None,
            forwarding_hint: Vec::new(),
            application_parameters: None,
            tags: TagMap::default(),
        }
    }

    /// Set the nonce for this Interest
    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the interest lifetime
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = Some(lifetime);
        self
    }

    /// Set the hop limit
    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    /// Allow the Interest to match Data under its name, not only at it
    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    /// Require fresh Data
    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Set the forwarding hint
    pub fn with_forwarding_hint(mut self, hint: Vec<Name>) -> Self {
        self.forwarding_hint = hint;
        self
    }

    /// Set application parameters
    pub fn with_application_parameters(mut self, params: Vec<u8>) -> Self {
        self.application_parameters = Some(params);
        self
    }

    /// Effective lifetime of this Interest
    pub fn lifetime(&self) -> Duration {
        self.interest_lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME)
    }

    /// Return the nonce, generating and storing a random one if absent
    pub fn ensure_nonce(&mut self) -> u32 {
        match self.nonce {
            Some(nonce) => nonce,
            None => {
                let nonce = rand::thread_rng().gen();
                self.nonce = Some(nonce);
                nonce
            }
        }
    }

    /// Check whether a Data packet satisfies this Interest
    pub fn matches_data(&self, data: &Data) -> bool {
        let name_matches = if self.can_be_prefix {
            self.name.is_prefix_of(&data.name)
        } else {
            self.name == data.name
        };
        if !name_matches {
            return false;
        }
        if self.must_be_fresh && data.freshness_period.unwrap_or(Duration::ZERO).is_zero() {
            return false;
        }
        true
    }

    /// Encode Interest packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut body = Vec::new();

        let name_encoded = self.name.encode()?;
        body.extend_from_slice(&name_encoded);

        if self.can_be_prefix {
            TlvElement::new(tlv_types::CAN_BE_PREFIX, vec![]).encode_to(&mut body)?;
        }
        if self.must_be_fresh {
            TlvElement::new(tlv_types::MUST_BE_FRESH, vec![]).encode_to(&mut body)?;
        }
        if !self.forwarding_hint.is_empty() {
            let mut hint_body = Vec::new();
            for name in &self.forwarding_hint {
                hint_body.extend_from_slice(&name.encode()?);
            }
            TlvElement::new(tlv_types::FORWARDING_HINT, hint_body).encode_to(&mut body)?;
        }
        if let Some(nonce) = self.nonce {
            TlvElement::new(tlv_types::NONCE, nonce.to_be_bytes().to_vec())
                .encode_to(&mut body)?;
        }
        if let Some(lifetime) = self.interest_lifetime {
            let lifetime_ms = lifetime.as_millis() as u64;
            TlvElement::new(tlv_types::INTEREST_LIFETIME, lifetime_ms.to_be_bytes().to_vec())
                .encode_to(&mut body)?;
        }
        if let Some(hop_limit) = self.hop_limit {
            TlvElement::new(tlv_types::HOP_LIMIT, vec![hop_limit]).encode_to(&mut body)?;
        }
        if let Some(params) = &self.application_parameters {
            TlvElement::new(tlv_types::APPLICATION_PARAMETERS, params.clone())
                .encode_to(&mut body)?;
        }

        TlvElement::new(tlv_types::INTEREST, body).encode()
    }

    /// Decode Interest packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (interest_element, consumed) = TlvElement::decode(data)?;
        if interest_element.type_ != tlv_types::INTEREST {
            return Err(TlvError::InvalidType(interest_element.type_));
        }

        let mut name = None;
        let mut interest = Interest::new(Name::new());

        for element in tlv::decode_tlv_sequence(&interest_element.value)? {
            match element.type_ {
                tlv_types::NAME => {
                    let encoded = element.encode()?;
                    name = Some(Name::decode(&encoded)?.0);
                }
                tlv_types::CAN_BE_PREFIX => interest.can_be_prefix = true,
                tlv_types::MUST_BE_FRESH => interest.must_be_fresh = true,
                tlv_types::FORWARDING_HINT => {
                    let mut offset = 0;
                    while offset < element.value.len() {
                        let (hint, used) = Name::decode(&element.value[offset..])?;
                        interest.forwarding_hint.push(hint);
                        offset += used;
                    }
                }
                tlv_types::NONCE => {
                    if element.value.len() != 4 {
                        return Err(TlvError::InvalidValue(element.value.len(), element.type_));
                    }
                    interest.nonce = Some(u32::from_be_bytes([
                        element.value[0],
                        element.value[1],
                        element.value[2],
                        element.value[3],
                    ]));
                }
                tlv_types::INTEREST_LIFETIME => {
                    if element.value.len() != 8 {
                        return Err(TlvError::InvalidValue(element.value.len(), element.type_));
                    }
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&element.value);
                    interest.interest_lifetime =
                        Some(Duration::from_millis(u64::from_be_bytes(buf)));
                }
                tlv_types::HOP_LIMIT => {
                    if element.value.len() != 1 {
                        return Err(TlvError::InvalidValue(element.value.len(), element.type_));
                    }
                    interest.hop_limit = Some(element.value[0]);
                }
                tlv_types::APPLICATION_PARAMETERS => {
                    interest.application_parameters = Some(element.value);
                }
                _ => {} // ignore unrecognized elements
            }
        }

        interest.name = name.ok_or(TlvError::InvalidType(tlv_types::NAME))?;
        Ok((interest, consumed))
    }
}

/// Data packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content: Vec<u8>,
    pub freshness_period: Option<Duration>,
    pub signature: Option<Vec<u8>>,
    #[serde(skip)]
    pub tags: TagMap,
}

impl Data {
    /// Create a new Data packet with the given name and content
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content,
            freshness_period: None,
            signature: None,
            tags: TagMap::default(),
        }
    }

    /// Set the freshness period
    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.freshness_period = Some(freshness_period);
        self
    }

    /// Set the signature bytes
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Encode Data packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut body = Vec::new();

        body.extend_from_slice(&self.name.encode()?);

        if let Some(freshness) = self.freshness_period {
            let freshness_ms = freshness.as_millis() as u64;
            TlvElement::new(tlv_types::FRESHNESS_PERIOD, freshness_ms.to_be_bytes().to_vec())
                .encode_to(&mut body)?;
        }

        TlvElement::new(tlv_types::CONTENT, self.content.clone()).encode_to(&mut body)?;

        if let Some(signature) = &self.signature {
            TlvElement::new(tlv_types::SIGNATURE_VALUE, signature.clone())
                .encode_to(&mut body)?;
        }

        TlvElement::new(tlv_types::DATA, body).encode()
    }

    /// Decode Data packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (data_element, consumed) = TlvElement::decode(data)?;
        if data_element.type_ != tlv_types::DATA {
            return Err(TlvError::InvalidType(data_element.type_));
        }

        let mut name = None;
        let mut packet = Data::new(Name::new(), Vec::new());

        for element in tlv::decode_tlv_sequence(&data_element.value)? {
            match element.type_ {
                tlv_types::NAME => {
                    let encoded = element.encode()?;
                    name = Some(Name::decode(&encoded)?.0);
                }
                tlv_types::FRESHNESS_PERIOD => {
                    if element.value.len() != 8 {
                        return Err(TlvError::InvalidValue(element.value.len(), element.type_));
                    }
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(&element.value);
                    packet.freshness_period =
                        Some(Duration::from_millis(u64::from_be_bytes(buf)));
                }
                tlv_types::CONTENT => packet.content = element.value,
                tlv_types::SIGNATURE_VALUE => packet.signature = Some(element.value),
                _ => {} // ignore unrecognized elements
            }
        }

        packet.name = name.ok_or(TlvError::InvalidType(tlv_types::NAME))?;
        Ok((packet, consumed))
    }
}

/// Reason code carried by a Nack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NackReason {
    None,
    Congestion,
    Duplicate,
    NoRoute,
}

impl NackReason {
    pub fn code(self) -> u8 {
        match self {
            NackReason::None => 0,
            NackReason::Congestion => 50,
            NackReason::Duplicate => 100,
            NackReason::NoRoute => 150,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            50 => NackReason::Congestion,
            100 => NackReason::Duplicate,
            150 => NackReason::NoRoute,
            _ => NackReason::None,
        }
    }

    /// Pick the less severe of two reasons; `None` counts as most severe
    pub fn less_severe(a: NackReason, b: NackReason) -> NackReason {
        if a == NackReason::None {
            return b;
        }
        if b == NackReason::None {
            return a;
        }
        if a.code() <= b.code() {
            a
        } else {
            b
        }
    }
}

impl std::fmt::Display for NackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NackReason::None => "none",
            NackReason::Congestion => "congestion",
            NackReason::Duplicate => "duplicate",
            NackReason::NoRoute => "no-route",
        };
        write!(f, "{}", s)
    }
}

/// Negative acknowledgement: an Interest an upstream cannot satisfy, plus a
/// reason code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nack {
    pub interest: Interest,
    pub reason: NackReason,
    #[serde(skip)]
    pub tags: TagMap,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self {
            interest,
            reason,
            tags: TagMap::default(),
        }
    }

    /// Encode Nack packet to TLV wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        let mut body = Vec::new();
        TlvElement::new(tlv_types::NACK_REASON, vec![self.reason.code()])
            .encode_to(&mut body)?;
        body.extend_from_slice(&self.interest.encode()?);
        TlvElement::new(tlv_types::NACK, body).encode()
    }

    /// Decode Nack packet from TLV wire format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (nack_element, consumed) = TlvElement::decode(data)?;
        if nack_element.type_ != tlv_types::NACK {
            return Err(TlvError::InvalidType(nack_element.type_));
        }

        let mut reason = NackReason::None;
        let mut interest = None;

        for element in tlv::decode_tlv_sequence(&nack_element.value)? {
            match element.type_ {
                tlv_types::NACK_REASON => {
                    if element.value.len() != 1 {
                        return Err(TlvError::InvalidValue(element.value.len(), element.type_));
                    }
                    reason = NackReason::from_code(element.value[0]);
                }
                tlv_types::INTEREST => {
                    let encoded = element.encode()?;
                    interest = Some(Interest::decode(&encoded)?.0);
                }
                _ => {}
            }
        }

        let interest = interest.ok_or(TlvError::InvalidType(tlv_types::INTEREST))?;
        Ok((Nack::new(interest, reason), consumed))
    }
}

/// Any packet a face can deliver or transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

impl Packet {
    /// Get the name of the packet
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
            Packet::Nack(nack) => &nack.interest.name,
        }
    }

    /// Encode the packet to wire format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        match self {
            Packet::Interest(interest) => interest.encode(),
            Packet::Data(data) => data.encode(),
            Packet::Nack(nack) => nack.encode(),
        }
    }

    /// Decode a packet of any type from wire format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        if data.is_empty() {
            return Err(TlvError::BufferTooShort);
        }
        match data[0] {
            tlv_types::INTEREST => {
                let (interest, consumed) = Interest::decode(data)?;
                Ok((Packet::Interest(interest), consumed))
            }
            tlv_types::DATA => {
                let (packet, consumed) = Data::decode(data)?;
                Ok((Packet::Data(packet), consumed))
            }
            tlv_types::NACK => {
                let (nack, consumed) = Nack::decode(data)?;
                Ok((Packet::Nack(nack), consumed))
            }
            other => Err(TlvError::InvalidType(other)),
        }
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Packet::Interest(interest)
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Packet::Data(data)
    }
}

impl From<Nack> for Packet {
    fn from(nack: Nack) -> Self {
        Packet::Nack(nack)
    }
}

/// Structural limits enforced at the face boundary, never on the
/// forwarding path
pub struct ValidationConfig {
    pub max_name_components: usize,
    pub max_component_size: usize,
    pub max_content_size: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_name_components: 32,
            max_component_size: 8192,
            max_content_size: 8 * 1024 * 1024,
        }
    }
}

/// Validation errors for packets
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Empty name is not allowed")]
    EmptyName,
    #[error("Name too deep: {depth} components (max: {max})")]
    NameTooDeep { depth: usize, max: usize },
    #[error("Name component too large: {size} bytes (max: {max})")]
    NameComponentTooLarge { size: usize, max: usize },
    #[error("Content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: usize, max: usize },
}

impl Name {
    /// Validate the name structure
    pub fn validate(&self, config: &ValidationConfig) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.len() > config.max_name_components {
            return Err(ValidationError::NameTooDeep {
                depth: self.len(),
                max: config.max_name_components,
            });
        }
        for component in &self.components {
            if component.len() > config.max_component_size {
                return Err(ValidationError::NameComponentTooLarge {
                    size: component.len(),
                    max: config.max_component_size,
                });
            }
        }
        Ok(())
    }
}

impl Interest {
    /// Validate the Interest packet
    pub fn validate(&self, config: &ValidationConfig) -> Result<(), ValidationError> {
        self.name.validate(config)
    }
}

impl Data {
    /// Validate the Data packet
    pub fn validate(&self, config: &ValidationConfig) -> Result<(), ValidationError> {
        self.name.validate(config)?;
        if self.content.len() > config.max_content_size {
            return Err(ValidationError::ContentTooLarge {
                size: self.content.len(),
                max: config.max_content_size,
            });
        }
        Ok(())
    }
}
