//! 仪器地址解析
//!
//! 支持的格式：
//! - `prologix://<host>[:<port>]/<gpib>`：LAN-GPIB 控制器，默认端口 1234
//! - `sim`（或 `sim://`）：模拟万用表
//! - `GPIB0::<gpib>::INSTR`：VISA 风格资源名，需要另行指定网关主机

use crate::BusError;
use std::fmt;
use std::str::FromStr;

/// Prologix 控制器默认 TCP 端口
pub const PROLOGIX_DEFAULT_PORT: u16 = 1234;

/// GPIB 主地址上限（0-30）
const GPIB_MAX_ADDRESS: u8 = 30;

/// 仪器地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusAddress {
    /// LAN-GPIB 控制器后的仪器
    Prologix { host: String, port: u16, gpib: u8 },
    /// 模拟万用表
    Simulated,
}

impl BusAddress {
    /// 通过 VISA 风格资源名和网关地址构造
    ///
    /// # 示例
    ///
    /// ```
    /// use calbench_bus::BusAddress;
    ///
    /// let addr = BusAddress::from_visa_resource("GPIB0::16::INSTR", "192.168.1.50").unwrap();
    /// assert_eq!(addr.to_string(), "prologix://192.168.1.50:1234/16");
    /// ```
    pub fn from_visa_resource(resource: &str, gateway: &str) -> Result<Self, BusError> {
        let gpib = parse_visa_gpib(resource)?;
        let (host, port) = split_host_port(gateway)?;
        Ok(BusAddress::Prologix { host, port, gpib })
    }

    /// 是否为模拟地址
    pub fn is_simulated(&self) -> bool {
        matches!(self, BusAddress::Simulated)
    }
}

impl FromStr for BusAddress {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.eq_ignore_ascii_case("sim") || s.eq_ignore_ascii_case("sim://") {
            return Ok(BusAddress::Simulated);
        }

        if let Some(rest) = s.strip_prefix("prologix://") {
            let (authority, gpib) = rest
                .rsplit_once('/')
                .ok_or_else(|| BusError::InvalidAddress(format!("missing GPIB address in {s:?}")))?;
            let gpib = parse_gpib(gpib)?;
            let (host, port) = split_host_port(authority)?;
            return Ok(BusAddress::Prologix { host, port, gpib });
        }

        if s.to_ascii_uppercase().starts_with("GPIB") {
            return Err(BusError::InvalidAddress(format!(
                "{s:?} needs a gateway host (use prologix://<host>/<gpib> or set `gateway`)"
            )));
        }

        Err(BusError::InvalidAddress(format!("unrecognized address {s:?}")))
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusAddress::Prologix { host, port, gpib } => {
                write!(f, "prologix://{}:{}/{}", host, port, gpib)
            },
            BusAddress::Simulated => write!(f, "sim"),
        }
    }
}

fn parse_gpib(s: &str) -> Result<u8, BusError> {
    match s.trim().parse::<u8>() {
        Ok(addr) if addr <= GPIB_MAX_ADDRESS => Ok(addr),
        _ => Err(BusError::InvalidAddress(format!(
            "GPIB address must be 0-{GPIB_MAX_ADDRESS}, got {s:?}"
        ))),
    }
}

fn parse_visa_gpib(resource: &str) -> Result<u8, BusError> {
    let parts: Vec<&str> = resource.trim().split("::").collect();
    match parts.as_slice() {
        [board, addr, kind]
            if board.to_ascii_uppercase().starts_with("GPIB")
                && kind.eq_ignore_ascii_case("INSTR") =>
        {
            parse_gpib(addr)
        },
        _ => Err(BusError::InvalidAddress(format!(
            "expected GPIB<n>::<addr>::INSTR, got {resource:?}"
        ))),
    }
}

fn split_host_port(authority: &str) -> Result<(String, u16), BusError> {
    let authority = authority.trim();
    if authority.is_empty() {
        return Err(BusError::InvalidAddress("empty host".to_string()));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| BusError::InvalidAddress(format!("invalid port {port:?}")))?;
            Ok((host.to_string(), port))
        },
        None => Ok((authority.to_string(), PROLOGIX_DEFAULT_PORT)),
    }
}
