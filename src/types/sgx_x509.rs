use anyhow::{anyhow, bail, Context, Result};
use asn1::{oid, ObjectIdentifier, SequenceOf};
use serde::{Deserialize, Serialize};

// https://download.01.org/intel-sgx/sgx-dcap/1.20/linux/docs/SGX_PCK_Certificate_CRL_Spec-1.4.pdf

// <SGX Extensions OID>:
//     <PPID OID>: <PPID value>
//     <TCB OID>:
//          <SGX TCB Comp01 SVN OID>: <SGX TCB Comp01 SVN value>
//          …
//          <SGX TCB Comp16 SVN OID>: <SGX TCB Comp16 SVN value>
//          <PCESVN OID>: <PCESVN value>
//          <CPUSVN OID>: <CPUSVN value>
//     <PCE-ID OID>: <PCE-ID value>
//     <FMSPC OID>: <FMSPC value>
//     <SGX Type OID>: <SGX Type value>
//     <PlatformInstanceID OID>: <PlatformInstanceID value>
//     <Configuration OID>:
//          <Dynamic Platform OID>: <Dynamic Platform flag value>
//          <Cached Keys OID>: <Cached Keys flag value>
//          <SMT Enabled OID>: <SMT Enabled flag value>

pub const SGX_EXTENSIONS_OID: &str = "1.2.840.113741.1.13.1";
const PPID_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 1);

const TCB_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2);
const TCB_COMP01SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 1);
const TCB_COMP02SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 2);
const TCB_COMP03SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 3);
const TCB_COMP04SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 4);
const TCB_COMP05SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 5);
const TCB_COMP06SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 6);
const TCB_COMP07SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 7);
const TCB_COMP08SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 8);
const TCB_COMP09SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 9);
const TCB_COMP10SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 10);
const TCB_COMP11SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 11);
const TCB_COMP12SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 12);
const TCB_COMP13SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 13);
const TCB_COMP14SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 14);
const TCB_COMP15SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 15);
const TCB_COMP16SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 16);
const TCB_PCESVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 17);
const TCB_CPUSVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 18);

const TCB_COMPSVN_OIDS: [ObjectIdentifier; COMPSVN_LEN] = [
    TCB_COMP01SVN_OID,
    TCB_COMP02SVN_OID,
    TCB_COMP03SVN_OID,
    TCB_COMP04SVN_OID,
    TCB_COMP05SVN_OID,
    TCB_COMP06SVN_OID,
    TCB_COMP07SVN_OID,
    TCB_COMP08SVN_OID,
    TCB_COMP09SVN_OID,
    TCB_COMP10SVN_OID,
    TCB_COMP11SVN_OID,
    TCB_COMP12SVN_OID,
    TCB_COMP13SVN_OID,
    TCB_COMP14SVN_OID,
    TCB_COMP15SVN_OID,
    TCB_COMP16SVN_OID,
];

const PCE_ID_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 3);
const FMSPC_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 4);
const SGX_TYPE_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 5);
const PLATFORM_INSTANCE_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 6);

const CONFIGURATION_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 7);
const CONFIGURATION_DYNAMIC_PLATFORM_OID: ObjectIdentifier =
    oid!(1, 2, 840, 113741, 1, 13, 1, 7, 1);
const CONFIGURATION_CACHED_KEYS_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 7, 2);
const CONFIGURATION_SMT_ENABLED_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 7, 3);

const PPID_LEN: usize = 16;
const CPUSVN_LEN: usize = 16;
const PCEID_LEN: usize = 2;
const FMSPC_LEN: usize = 6;
const PLATFORM_INSTANCE_ID_LEN: usize = 16;
const COMPSVN_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SgxType {
    Standard,
    Scalable,
    ScalableWithIntegrity,
}

impl TryFrom<u32> for SgxType {
    type Error = anyhow::Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(SgxType::Standard),
            1 => Ok(SgxType::Scalable),
            2 => Ok(SgxType::ScalableWithIntegrity),
            _ => bail!("unknown sgx type {}", value),
        }
    }
}

/// TCB of the platform the PCK certificate was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SgxExtensionTcbLevel {
    /// sgxtcbcomp01svn ..= sgxtcbcomp16svn, in order.
    pub sgxtcbcompsvn: [u32; COMPSVN_LEN],
    pub pcesvn: u32,
    pub cpusvn: [u8; CPUSVN_LEN],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PckPlatformConfiguration {
    pub dynamic_platform: Option<bool>,
    pub cached_keys: Option<bool>,
    pub smt_enabled: Option<bool>,
}

/// Contents of the Intel SGX extension carried by PCK certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SgxPckExtension {
    pub ppid: [u8; PPID_LEN],
    pub tcb: SgxExtensionTcbLevel,
    pub pceid: [u8; PCEID_LEN],
    pub fmspc: [u8; FMSPC_LEN],
    pub sgx_type: SgxType,
    /// Only present on platform CA issued certificates.
    pub platform_instance_id: Option<[u8; PLATFORM_INSTANCE_ID_LEN]>,
    pub configuration: Option<PckPlatformConfiguration>,
}

fn asn1_err(e: asn1::ParseError) -> anyhow::Error {
    anyhow!("{:?}", e)
}

/// Reads every `SEQUENCE { oid, value }` entry of a `SEQUENCE OF`.
fn oid_entries(der: &[u8]) -> Result<Vec<(ObjectIdentifier, asn1::Tlv<'_>)>> {
    let entries = asn1::parse_single::<SequenceOf<'_, asn1::Sequence<'_>>>(der).map_err(asn1_err)?;
    entries
        .map(|entry| {
            entry
                .parse(|p| {
                    Ok::<_, asn1::ParseError>((
                        p.read_element::<ObjectIdentifier>()?,
                        p.read_element::<asn1::Tlv<'_>>()?,
                    ))
                })
                .map_err(asn1_err)
        })
        .collect()
}

fn octets<const N: usize>(value: &asn1::Tlv<'_>, field: &str) -> Result<[u8; N]> {
    let bytes = value.parse::<&[u8]>().map_err(asn1_err).with_context(|| field.to_string())?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("{} should be {} bytes, got {}", field, N, bytes.len()))
}

fn small_uint(value: &asn1::Tlv<'_>, field: &str) -> Result<u32> {
    let n = value.parse::<u64>().map_err(asn1_err).with_context(|| field.to_string())?;
    u32::try_from(n).with_context(|| format!("{} out of range", field))
}

impl SgxPckExtension {
    /// Parses the DER value of the SGX extension (OID 1.2.840.113741.1.13.1).
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let mut ppid = None;
        let mut tcb = None;
        let mut pceid = None;
        let mut fmspc = None;
        let mut sgx_type = None;
        let mut platform_instance_id = None;
        let mut configuration = None;

        for (oid, value) in oid_entries(der)? {
            if oid == PPID_OID {
                ppid = Some(octets::<PPID_LEN>(&value, "ppid")?);
            } else if oid == TCB_OID {
                tcb = Some(Self::parse_tcb(value.full_data())?);
            } else if oid == PCE_ID_OID {
                pceid = Some(octets::<PCEID_LEN>(&value, "pceid")?);
            } else if oid == FMSPC_OID {
                fmspc = Some(octets::<FMSPC_LEN>(&value, "fmspc")?);
            } else if oid == SGX_TYPE_OID {
                let raw = value.parse::<asn1::Enumerated>().map_err(asn1_err)?;
                sgx_type = Some(SgxType::try_from(raw.value())?);
            } else if oid == PLATFORM_INSTANCE_OID {
                platform_instance_id =
                    Some(octets::<PLATFORM_INSTANCE_ID_LEN>(&value, "platform instance id")?);
            } else if oid == CONFIGURATION_OID {
                configuration = Some(Self::parse_configuration(value.full_data())?);
            }
        }

        Ok(SgxPckExtension {
            ppid: ppid.context("missing ppid")?,
            tcb: tcb.context("missing tcb")?,
            pceid: pceid.context("missing pceid")?,
            fmspc: fmspc.context("missing fmspc")?,
            sgx_type: sgx_type.context("missing sgx type")?,
            platform_instance_id,
            configuration,
        })
    }

    fn parse_tcb(der: &[u8]) -> Result<SgxExtensionTcbLevel> {
        let mut components = [None; COMPSVN_LEN];
        let mut pcesvn = None;
        let mut cpusvn = None;

        for (oid, value) in oid_entries(der)? {
            if let Some(index) = TCB_COMPSVN_OIDS.iter().position(|comp| *comp == oid) {
                components[index] = Some(small_uint(&value, "sgxtcbcompsvn")?);
            } else if oid == TCB_PCESVN_OID {
                pcesvn = Some(small_uint(&value, "pcesvn")?);
            } else if oid == TCB_CPUSVN_OID {
                cpusvn = Some(octets::<CPUSVN_LEN>(&value, "cpusvn")?);
            }
        }

        let mut sgxtcbcompsvn = [0u32; COMPSVN_LEN];
        for (index, component) in components.into_iter().enumerate() {
            sgxtcbcompsvn[index] =
                component.with_context(|| format!("missing sgxtcbcomp{:02}svn", index + 1))?;
        }

        Ok(SgxExtensionTcbLevel {
            sgxtcbcompsvn,
            pcesvn: pcesvn.context("missing pcesvn")?,
            cpusvn: cpusvn.context("missing cpusvn")?,
        })
    }

    fn parse_configuration(der: &[u8]) -> Result<PckPlatformConfiguration> {
        let mut configuration = PckPlatformConfiguration::default();
        for (oid, value) in oid_entries(der)? {
            let flag = value.parse::<bool>().map_err(asn1_err)?;
            if oid == CONFIGURATION_DYNAMIC_PLATFORM_OID {
                configuration.dynamic_platform = Some(flag);
            } else if oid == CONFIGURATION_CACHED_KEYS_OID {
                configuration.cached_keys = Some(flag);
            } else if oid == CONFIGURATION_SMT_ENABLED_OID {
                configuration.smt_enabled = Some(flag);
            }
        }
        Ok(configuration)
    }
}
