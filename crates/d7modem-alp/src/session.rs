//! Session configuration carried by a forward action.
//!
//! Each interface has its own fixed layout. [`SessionConfig::Host`] carries
//! nothing and means the command is executed by the modem itself.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{AlpError, Result};

/// ALP interface identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceId {
    Host,
    LorawanAbp,
    LorawanOtaa,
    D7asp,
}

impl InterfaceId {
    pub const HOST: u8 = 0x00;
    pub const LORAWAN_ABP: u8 = 0x02;
    pub const LORAWAN_OTAA: u8 = 0x03;
    pub const D7ASP: u8 = 0xD7;

    pub fn as_u8(self) -> u8 {
        match self {
            InterfaceId::Host => Self::HOST,
            InterfaceId::LorawanAbp => Self::LORAWAN_ABP,
            InterfaceId::LorawanOtaa => Self::LORAWAN_OTAA,
            InterfaceId::D7asp => Self::D7ASP,
        }
    }
}

impl TryFrom<u8> for InterfaceId {
    type Error = AlpError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            Self::HOST => Ok(InterfaceId::Host),
            Self::LORAWAN_ABP => Ok(InterfaceId::LorawanAbp),
            Self::LORAWAN_OTAA => Ok(InterfaceId::LorawanOtaa),
            Self::D7ASP => Ok(InterfaceId::D7asp),
            other => Err(AlpError::UnknownInterface(other)),
        }
    }
}

/// D7 session response mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    No = 0,
    All = 1,
    Any = 2,
    NoRepeat = 4,
    OnError = 5,
    #[default]
    Preferred = 6,
}

impl TryFrom<u8> for ResponseMode {
    type Error = AlpError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(ResponseMode::No),
            1 => Ok(ResponseMode::All),
            2 => Ok(ResponseMode::Any),
            4 => Ok(ResponseMode::NoRepeat),
            5 => Ok(ResponseMode::OnError),
            6 => Ok(ResponseMode::Preferred),
            value => Err(AlpError::InvalidField {
                field: "response mode",
                value,
            }),
        }
    }
}

/// D7 session retry mode. The stack defines a single mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    #[default]
    No = 0,
}

impl TryFrom<u8> for RetryMode {
    type Error = AlpError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(RetryMode::No),
            value => Err(AlpError::InvalidField {
                field: "retry mode",
                value,
            }),
        }
    }
}

/// Network layer security method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NlsMethod {
    #[default]
    None = 0,
    AesCtr = 1,
    AesCbcMac128 = 2,
    AesCbcMac64 = 3,
    AesCbcMac32 = 4,
    AesCcm128 = 5,
    AesCcm64 = 6,
    AesCcm32 = 7,
}

impl TryFrom<u8> for NlsMethod {
    type Error = AlpError;

    fn try_from(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => NlsMethod::None,
            1 => NlsMethod::AesCtr,
            2 => NlsMethod::AesCbcMac128,
            3 => NlsMethod::AesCbcMac64,
            4 => NlsMethod::AesCbcMac32,
            5 => NlsMethod::AesCcm128,
            6 => NlsMethod::AesCcm64,
            7 => NlsMethod::AesCcm32,
            value => {
                return Err(AlpError::InvalidField {
                    field: "nls method",
                    value,
                })
            }
        })
    }
}

/// Addressee identifier. The variant determines the id length on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddresseeId {
    /// Broadcast to an estimated number of neighbours.
    Nbid(u8),
    /// Broadcast, no id.
    #[default]
    NoId,
    /// Unique 64-bit device id.
    Uid([u8; 8]),
    /// Virtual 16-bit id.
    Vid([u8; 2]),
}

impl AddresseeId {
    pub const TYPE_NBID: u8 = 0;
    pub const TYPE_NOID: u8 = 1;
    pub const TYPE_UID: u8 = 2;
    pub const TYPE_VID: u8 = 3;

    pub fn id_type(&self) -> u8 {
        match self {
            AddresseeId::Nbid(_) => Self::TYPE_NBID,
            AddresseeId::NoId => Self::TYPE_NOID,
            AddresseeId::Uid(_) => Self::TYPE_UID,
            AddresseeId::Vid(_) => Self::TYPE_VID,
        }
    }

    /// Id length on the wire for a given id type.
    pub fn len_for_type(id_type: u8) -> usize {
        match id_type & 0x03 {
            Self::TYPE_NBID => 1,
            Self::TYPE_NOID => 0,
            Self::TYPE_UID => 8,
            _ => 2,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            AddresseeId::Nbid(estimate) => std::slice::from_ref(estimate),
            AddresseeId::NoId => &[],
            AddresseeId::Uid(uid) => uid,
            AddresseeId::Vid(vid) => vid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Qos {
    pub resp_mode: ResponseMode,
    pub retry_mode: RetryMode,
    pub record: bool,
    pub stop_on_error: bool,
}

impl Qos {
    fn to_byte(self) -> u8 {
        (self.resp_mode as u8)
            | ((self.retry_mode as u8) << 3)
            | (u8::from(self.record) << 6)
            | (u8::from(self.stop_on_error) << 7)
    }

    fn from_byte(byte: u8) -> Result<Self> {
        Ok(Self {
            resp_mode: ResponseMode::try_from(byte & 0x07)?,
            retry_mode: RetryMode::try_from((byte >> 3) & 0x07)?,
            record: byte & 0x40 != 0,
            stop_on_error: byte & 0x80 != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressee {
    pub nls_method: NlsMethod,
    pub access_class: u8,
    pub id: AddresseeId,
}

impl Default for Addressee {
    fn default() -> Self {
        Self {
            nls_method: NlsMethod::None,
            access_class: 0x01,
            id: AddresseeId::NoId,
        }
    }
}

/// D7AP session parameters.
///
/// The default broadcasts with the preferred response mode on access class 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct D7apSessionConfig {
    pub qos: Qos,
    pub dormant_timeout: u8,
    pub addressee: Addressee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorawanAbpConfig {
    pub request_ack: bool,
    pub adr_enabled: bool,
    pub application_port: u8,
    pub app_session_key: [u8; 16],
    pub network_session_key: [u8; 16],
    pub device_address: u32,
    pub network_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorawanOtaaConfig {
    pub request_ack: bool,
    pub adr_enabled: bool,
    pub application_port: u8,
    pub device_eui: [u8; 8],
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
}

fn lorawan_ctrl(adr_enabled: bool, request_ack: bool) -> u8 {
    u8::from(adr_enabled) | (u8::from(request_ack) << 1)
}

/// Where and how an unsolicited response is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "interface", content = "config", rename_all = "snake_case")]
pub enum SessionConfig {
    /// Handled by the modem itself; no forward action.
    Host,
    D7ap(D7apSessionConfig),
    LorawanAbp(LorawanAbpConfig),
    LorawanOtaa(LorawanOtaaConfig),
}

const ABP_SIZE: usize = 2 + 16 + 16 + 4 + 4;
const OTAA_SIZE: usize = 2 + 8 + 8 + 16;

impl SessionConfig {
    pub fn interface(&self) -> InterfaceId {
        match self {
            SessionConfig::Host => InterfaceId::Host,
            SessionConfig::D7ap(_) => InterfaceId::D7asp,
            SessionConfig::LorawanAbp(_) => InterfaceId::LorawanAbp,
            SessionConfig::LorawanOtaa(_) => InterfaceId::LorawanOtaa,
        }
    }

    /// Whether a forward action is emitted for this configuration.
    pub fn forwards(&self) -> bool {
        !matches!(self, SessionConfig::Host)
    }

    /// Serialized size of the configuration (interface id excluded).
    pub fn encoded_len(&self) -> usize {
        match self {
            SessionConfig::Host => 0,
            SessionConfig::D7ap(d7) => 4 + d7.addressee.id.as_bytes().len(),
            SessionConfig::LorawanAbp(_) => ABP_SIZE,
            SessionConfig::LorawanOtaa(_) => OTAA_SIZE,
        }
    }

    /// Append the interface-specific configuration bytes.
    pub fn append_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        match self {
            SessionConfig::Host => {}
            SessionConfig::D7ap(d7) => {
                let addressee = &d7.addressee;
                dst.put_u8(d7.qos.to_byte());
                dst.put_u8(d7.dormant_timeout);
                dst.put_u8((addressee.nls_method as u8) | (addressee.id.id_type() << 4));
                dst.put_u8(addressee.access_class);
                dst.put_slice(addressee.id.as_bytes());
            }
            SessionConfig::LorawanAbp(abp) => {
                dst.put_u8(lorawan_ctrl(abp.adr_enabled, abp.request_ack));
                dst.put_u8(abp.application_port);
                dst.put_slice(&abp.app_session_key);
                dst.put_slice(&abp.network_session_key);
                dst.put_u32(abp.device_address);
                dst.put_u32(abp.network_id);
            }
            SessionConfig::LorawanOtaa(otaa) => {
                dst.put_u8(lorawan_ctrl(otaa.adr_enabled, otaa.request_ack));
                dst.put_u8(otaa.application_port);
                dst.put_slice(&otaa.device_eui);
                dst.put_slice(&otaa.app_eui);
                dst.put_slice(&otaa.app_key);
            }
        }
    }

    /// Decode the configuration that follows an interface id.
    ///
    /// Returns the configuration and the number of bytes consumed.
    pub fn decode(interface: InterfaceId, src: &[u8]) -> Result<(Self, usize)> {
        match interface {
            InterfaceId::Host => Ok((SessionConfig::Host, 0)),
            InterfaceId::D7asp => {
                let fixed = take(src, 0, 4)?;
                let id_type = (fixed[2] >> 4) & 0x03;
                let id_len = AddresseeId::len_for_type(id_type);
                let id_bytes = take(src, 4, id_len)?;
                let id = match id_type {
                    AddresseeId::TYPE_NBID => AddresseeId::Nbid(id_bytes[0]),
                    AddresseeId::TYPE_NOID => AddresseeId::NoId,
                    AddresseeId::TYPE_UID => AddresseeId::Uid(array(id_bytes)),
                    _ => AddresseeId::Vid(array(id_bytes)),
                };
                let config = D7apSessionConfig {
                    qos: Qos::from_byte(fixed[0])?,
                    dormant_timeout: fixed[1],
                    addressee: Addressee {
                        nls_method: NlsMethod::try_from(fixed[2] & 0x0F)?,
                        access_class: fixed[3],
                        id,
                    },
                };
                Ok((SessionConfig::D7ap(config), 4 + id_len))
            }
            InterfaceId::LorawanAbp => {
                let raw = take(src, 0, ABP_SIZE)?;
                let config = LorawanAbpConfig {
                    adr_enabled: raw[0] & 0x01 != 0,
                    request_ack: raw[0] & 0x02 != 0,
                    application_port: raw[1],
                    app_session_key: array(&raw[2..18]),
                    network_session_key: array(&raw[18..34]),
                    device_address: u32::from_be_bytes(array(&raw[34..38])),
                    network_id: u32::from_be_bytes(array(&raw[38..42])),
                };
                Ok((SessionConfig::LorawanAbp(config), ABP_SIZE))
            }
            InterfaceId::LorawanOtaa => {
                let raw = take(src, 0, OTAA_SIZE)?;
                let config = LorawanOtaaConfig {
                    adr_enabled: raw[0] & 0x01 != 0,
                    request_ack: raw[0] & 0x02 != 0,
                    application_port: raw[1],
                    device_eui: array(&raw[2..10]),
                    app_eui: array(&raw[10..18]),
                    app_key: array(&raw[18..34]),
                };
                Ok((SessionConfig::LorawanOtaa(config), OTAA_SIZE))
            }
        }
    }
}

fn take(src: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    src.get(start..start + len).ok_or(AlpError::Truncated {
        needed: start + len,
        available: src.len(),
    })
}

// Callers slice exactly N bytes.
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(config: &SessionConfig) -> Vec<u8> {
        let mut buf = BytesMut::new();
        config.append_to(&mut buf);
        assert_eq!(buf.len(), config.encoded_len());
        buf.to_vec()
    }

    #[test]
    fn default_d7_config_layout() {
        let config = SessionConfig::D7ap(D7apSessionConfig::default());
        // PREFERRED, no retry | dormant 0 | NLS none, NOID | access class 1
        assert_eq!(encode(&config), vec![0x06, 0x00, 0x10, 0x01]);
        assert_eq!(config.interface().as_u8(), 0xD7);
    }

    #[test]
    fn d7_qos_flags_and_uid() {
        let config = SessionConfig::D7ap(D7apSessionConfig {
            qos: Qos {
                resp_mode: ResponseMode::Any,
                retry_mode: RetryMode::No,
                record: true,
                stop_on_error: true,
            },
            dormant_timeout: 5,
            addressee: Addressee {
                nls_method: NlsMethod::AesCcm64,
                access_class: 0x21,
                id: AddresseeId::Uid([1, 2, 3, 4, 5, 6, 7, 8]),
            },
        });
        let wire = encode(&config);
        assert_eq!(&wire[..4], &[0xC2, 0x05, 0x26, 0x21]);
        assert_eq!(&wire[4..], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let (decoded, used) = SessionConfig::decode(InterfaceId::D7asp, &wire).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(used, 12);
    }

    #[test]
    fn d7_id_lengths_follow_id_type() {
        assert_eq!(AddresseeId::len_for_type(AddresseeId::TYPE_NBID), 1);
        assert_eq!(AddresseeId::len_for_type(AddresseeId::TYPE_NOID), 0);
        assert_eq!(AddresseeId::len_for_type(AddresseeId::TYPE_UID), 8);
        assert_eq!(AddresseeId::len_for_type(AddresseeId::TYPE_VID), 2);

        let vid = SessionConfig::D7ap(D7apSessionConfig {
            addressee: Addressee {
                id: AddresseeId::Vid([0xAB, 0xCD]),
                ..Addressee::default()
            },
            ..D7apSessionConfig::default()
        });
        assert_eq!(encode(&vid), vec![0x06, 0x00, 0x30, 0x01, 0xAB, 0xCD]);
    }

    #[test]
    fn abp_layout() {
        let config = SessionConfig::LorawanAbp(LorawanAbpConfig {
            request_ack: true,
            adr_enabled: false,
            application_port: 2,
            app_session_key: [0x11; 16],
            network_session_key: [0x22; 16],
            device_address: 0x2601_1F4A,
            network_id: 0x13,
        });
        let wire = encode(&config);
        assert_eq!(wire.len(), 42);
        assert_eq!(&wire[..2], &[0x02, 0x02]);
        assert_eq!(&wire[34..38], &[0x26, 0x01, 0x1F, 0x4A]);
        assert_eq!(&wire[38..], &[0, 0, 0, 0x13]);

        let (decoded, used) = SessionConfig::decode(InterfaceId::LorawanAbp, &wire).unwrap();
        assert_eq!((decoded, used), (config, 42));
    }

    #[test]
    fn otaa_layout() {
        let config = SessionConfig::LorawanOtaa(LorawanOtaaConfig {
            request_ack: false,
            adr_enabled: true,
            application_port: 1,
            device_eui: [0xDE; 8],
            app_eui: [0xAE; 8],
            app_key: [0x5A; 16],
        });
        let wire = encode(&config);
        assert_eq!(wire.len(), 34);
        assert_eq!(&wire[..3], &[0x01, 0x01, 0xDE]);
        assert_eq!(config.interface().as_u8(), 0x03);
    }

    #[test]
    fn host_config_is_empty() {
        assert!(!SessionConfig::Host.forwards());
        assert!(encode(&SessionConfig::Host).is_empty());
        assert_eq!(
            SessionConfig::decode(InterfaceId::Host, &[0xFF]).unwrap(),
            (SessionConfig::Host, 0)
        );
    }

    #[test]
    fn truncated_and_invalid_configs() {
        assert!(matches!(
            SessionConfig::decode(InterfaceId::D7asp, &[0x06, 0x00, 0x20, 0x01, 1, 2]),
            Err(AlpError::Truncated { needed: 12, .. })
        ));
        assert_eq!(
            SessionConfig::decode(InterfaceId::D7asp, &[0x03, 0x00, 0x10, 0x01]),
            Err(AlpError::InvalidField {
                field: "response mode",
                value: 3
            })
        );
        assert_eq!(InterfaceId::try_from(0x42), Err(AlpError::UnknownInterface(0x42)));
    }

    #[test]
    fn json_form_is_tagged_by_interface() {
        let json = r#"{"interface":"d7ap","config":{"qos":{"resp_mode":"any","retry_mode":"no","record":false,"stop_on_error":false},"dormant_timeout":0,"addressee":{"nls_method":"none","access_class":1,"id":{"nbid":4}}}}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        let SessionConfig::D7ap(d7) = config else {
            panic!("expected a D7 configuration");
        };
        assert_eq!(d7.qos.resp_mode, ResponseMode::Any);
        assert_eq!(d7.addressee.id, AddresseeId::Nbid(4));
    }
}
