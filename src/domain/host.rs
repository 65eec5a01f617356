//! Host — one proxy endpoint's address, transport, and security parameters.
//!
//! Hosts are constructed explicitly through [`HostDraft`] and mutated only
//! through [`HostPatch`]. Every operation here is a pure function over a
//! `Host` value plus caller-supplied policy; nothing touches shared state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ControlError;

/// Transport security negotiated for a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLayer {
    /// Inherit the security settings of the inbound the host points at.
    #[default]
    Default,
    None,
    Tls,
    Reality,
}

impl FromStr for SecurityLayer {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(Self::Default),
            "NONE" => Ok(Self::None),
            "TLS" => Ok(Self::Tls),
            "REALITY" => Ok(Self::Reality),
            other => Err(ControlError::invalid(
                "securityLayer",
                format!("unknown security layer '{other}' (expected DEFAULT, NONE, TLS or REALITY)"),
            )),
        }
    }
}

impl fmt::Display for SecurityLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "DEFAULT",
            Self::None => "NONE",
            Self::Tls => "TLS",
            Self::Reality => "REALITY",
        };
        f.write_str(s)
    }
}

/// A configured proxy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: Uuid,
    pub view_position: i32,
    pub remark: String,

    pub address: String,
    pub port: u32,
    pub path: Option<String>,

    pub security_layer: SecurityLayer,
    pub sni: Option<String>,
    pub host: Option<String>,
    pub alpn: Option<String>,
    pub fingerprint: Option<String>,

    pub is_disabled: bool,
    pub is_hidden: bool,
    pub override_sni_from_address: bool,

    /// Opaque blobs owned by the transport layer. Only their shape is checked.
    pub x_http_extra_params: Option<Value>,
    pub mux_params: Option<Value>,
    pub sockopt_params: Option<Value>,

    pub route_id: Option<i64>,
    pub config_profile_id: Option<Uuid>,
    pub config_profile_inbound_id: Option<Uuid>,

    pub server_description: Option<String>,
    pub tag: Option<String>,
}

/// Fingerprint fallback supplied by the caller, never hardcoded here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintPolicy {
    #[serde(default)]
    pub default_fingerprint: Option<String>,
}

impl FingerprintPolicy {
    pub fn new(default_fingerprint: Option<String>) -> Self {
        Self {
            default_fingerprint,
        }
    }
}

impl Host {
    /// Check field ranges, blob shapes, and association consistency.
    /// `remark`, `server_description` and `tag` are free-form.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.address.trim().is_empty() {
            return Err(ControlError::invalid("address", "must not be empty"));
        }
        if self.address.chars().any(char::is_whitespace) {
            return Err(ControlError::invalid("address", "must not contain whitespace"));
        }

        if !(1..=65535).contains(&self.port) {
            return Err(ControlError::invalid(
                "port",
                format!("{} is outside 1-65535", self.port),
            ));
        }

        if let Some(sni) = &self.sni {
            if sni.trim().is_empty() {
                return Err(ControlError::invalid("sni", "must not be empty when set"));
            }
            if sni.chars().any(char::is_whitespace) {
                return Err(ControlError::invalid("sni", "must not contain whitespace"));
            }
        }

        if let Some(alpn) = &self.alpn {
            if alpn.split(',').any(|p| p.trim().is_empty()) {
                return Err(ControlError::invalid(
                    "alpn",
                    "protocol list contains an empty entry",
                ));
            }
        }

        if let Some(fp) = &self.fingerprint {
            if fp.trim().is_empty() {
                return Err(ControlError::invalid("fingerprint", "must not be empty when set"));
            }
        }

        check_blob("xHttpExtraParams", self.x_http_extra_params.as_ref())?;
        check_blob("muxParams", self.mux_params.as_ref())?;
        check_blob("sockoptParams", self.sockopt_params.as_ref())?;

        if self.config_profile_inbound_id.is_some() && self.config_profile_id.is_none() {
            return Err(ControlError::invalid(
                "configProfileInboundId",
                "an inbound link requires configProfileId",
            ));
        }

        Ok(())
    }

    /// The SNI the transport should present.
    ///
    /// An explicit `sni` always wins; `override_sni_from_address` is only a
    /// fallback for hosts without one.
    pub fn resolve_effective_sni(&self) -> Option<&str> {
        match &self.sni {
            Some(sni) => Some(sni.as_str()),
            None if self.override_sni_from_address => Some(self.address.as_str()),
            None => None,
        }
    }

    /// Explicit fingerprint, else the policy default. Blank values don't count.
    pub fn resolve_fingerprint<'a>(&'a self, policy: &'a FingerprintPolicy) -> Option<&'a str> {
        self.fingerprint
            .as_deref()
            .or(policy.default_fingerprint.as_deref())
            .filter(|fp| !fp.trim().is_empty())
    }

    pub fn is_routable(&self, policy: &FingerprintPolicy) -> bool {
        if self.is_disabled {
            return false;
        }
        match self.security_layer {
            SecurityLayer::Reality => self.resolve_fingerprint(policy).is_some(),
            _ => true,
        }
    }

    /// ALPN entries in declaration order.
    pub fn alpn_protocols(&self) -> Vec<&str> {
        self.alpn
            .as_deref()
            .map(|a| a.split(',').map(str::trim).collect())
            .unwrap_or_default()
    }
}

fn check_blob(field: &'static str, blob: Option<&Value>) -> Result<(), ControlError> {
    match blob {
        None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
        Some(other) => Err(ControlError::invalid(
            field,
            format!("expected an object, got {}", value_kind(other)),
        )),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Construction ───────────────────────────────────────────

/// Input for creating a host. Every field is listed; unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostDraft {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub view_position: i32,
    pub remark: String,

    pub address: String,
    pub port: i64,
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub security_layer: Option<String>,
    #[serde(default)]
    pub sni: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub alpn: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub override_sni_from_address: bool,

    #[serde(default)]
    pub x_http_extra_params: Option<Value>,
    #[serde(default)]
    pub mux_params: Option<Value>,
    #[serde(default)]
    pub sockopt_params: Option<Value>,

    #[serde(default)]
    pub route_id: Option<i64>,
    #[serde(default)]
    pub config_profile_id: Option<Uuid>,
    #[serde(default)]
    pub config_profile_inbound_id: Option<Uuid>,

    #[serde(default)]
    pub server_description: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl HostDraft {
    /// Minimal draft; the remaining fields take their documented defaults.
    #[cfg(test)]
    pub fn new(remark: &str, address: &str, port: i64) -> Self {
        Self {
            id: None,
            view_position: 0,
            remark: remark.to_string(),
            address: address.to_string(),
            port,
            path: None,
            security_layer: None,
            sni: None,
            host: None,
            alpn: None,
            fingerprint: None,
            is_disabled: false,
            is_hidden: false,
            override_sni_from_address: false,
            x_http_extra_params: None,
            mux_params: None,
            sockopt_params: None,
            route_id: None,
            config_profile_id: None,
            config_profile_inbound_id: None,
            server_description: None,
            tag: None,
        }
    }

    /// Build and validate a host. A missing id is freshly generated.
    pub fn build(self) -> Result<Host, ControlError> {
        let security_layer = match self.security_layer.as_deref() {
            Some(raw) => raw.parse()?,
            None => SecurityLayer::default(),
        };

        let host = Host {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            view_position: self.view_position,
            remark: self.remark,
            address: self.address,
            port: parse_port(self.port)?,
            path: self.path,
            security_layer,
            sni: self.sni,
            host: self.host,
            alpn: self.alpn,
            fingerprint: self.fingerprint,
            is_disabled: self.is_disabled,
            is_hidden: self.is_hidden,
            override_sni_from_address: self.override_sni_from_address,
            x_http_extra_params: self.x_http_extra_params,
            mux_params: self.mux_params,
            sockopt_params: self.sockopt_params,
            route_id: self.route_id,
            config_profile_id: self.config_profile_id,
            config_profile_inbound_id: self.config_profile_inbound_id,
            server_description: self.server_description,
            tag: self.tag,
        };

        host.validate()?;
        Ok(host)
    }
}

fn parse_port(raw: i64) -> Result<u32, ControlError> {
    u32::try_from(raw)
        .map_err(|_| ControlError::invalid("port", format!("{raw} is outside 1-65535")))
}

// ── Partial update ─────────────────────────────────────────

/// Field-by-field update. For nullable fields the outer `Option` means
/// "present in the request" and the inner one carries an explicit null.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostPatch {
    #[serde(default)]
    pub view_position: Option<i32>,
    #[serde(default)]
    pub remark: Option<String>,

    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub path: Option<Option<String>>,

    #[serde(default)]
    pub security_layer: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub sni: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub host: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub alpn: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub fingerprint: Option<Option<String>>,

    #[serde(default)]
    pub is_disabled: Option<bool>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub override_sni_from_address: Option<bool>,

    #[serde(default, deserialize_with = "nullable")]
    pub x_http_extra_params: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub mux_params: Option<Option<Value>>,
    #[serde(default, deserialize_with = "nullable")]
    pub sockopt_params: Option<Option<Value>>,

    #[serde(default, deserialize_with = "nullable")]
    pub route_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub config_profile_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub config_profile_inbound_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "nullable")]
    pub server_description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tag: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl HostPatch {
    /// Apply the present fields onto `host`. The result is not validated;
    /// callers validate the patched value before persisting it.
    pub fn apply(self, host: &mut Host) -> Result<(), ControlError> {
        if let Some(raw) = self.security_layer {
            host.security_layer = raw.parse()?;
        }
        if let Some(raw) = self.port {
            host.port = parse_port(raw)?;
        }

        set(&mut host.view_position, self.view_position);
        set(&mut host.remark, self.remark);
        set(&mut host.address, self.address);
        set(&mut host.path, self.path);
        set(&mut host.sni, self.sni);
        set(&mut host.host, self.host);
        set(&mut host.alpn, self.alpn);
        set(&mut host.fingerprint, self.fingerprint);
        set(&mut host.is_disabled, self.is_disabled);
        set(&mut host.is_hidden, self.is_hidden);
        set(&mut host.override_sni_from_address, self.override_sni_from_address);
        set(&mut host.x_http_extra_params, self.x_http_extra_params);
        set(&mut host.mux_params, self.mux_params);
        set(&mut host.sockopt_params, self.sockopt_params);
        set(&mut host.route_id, self.route_id);
        set(&mut host.config_profile_id, self.config_profile_id);
        set(&mut host.config_profile_inbound_id, self.config_profile_inbound_id);
        set(&mut host.server_description, self.server_description);
        set(&mut host.tag, self.tag);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.view_position.is_none()
            && self.remark.is_none()
            && self.address.is_none()
            && self.port.is_none()
            && self.path.is_none()
            && self.security_layer.is_none()
            && self.sni.is_none()
            && self.host.is_none()
            && self.alpn.is_none()
            && self.fingerprint.is_none()
            && self.is_disabled.is_none()
            && self.is_hidden.is_none()
            && self.override_sni_from_address.is_none()
            && self.x_http_extra_params.is_none()
            && self.mux_params.is_none()
            && self.sockopt_params.is_none()
            && self.route_id.is_none()
            && self.config_profile_id.is_none()
            && self.config_profile_inbound_id.is_none()
            && self.server_description.is_none()
            && self.tag.is_none()
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

// ── API projection ─────────────────────────────────────────

/// A host together with the values downstream negotiation derives from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostView {
    #[serde(flatten)]
    pub host: Host,
    pub effective_sni: Option<String>,
    pub effective_fingerprint: Option<String>,
    pub routable: bool,
}

impl HostView {
    pub fn new(host: Host, policy: &FingerprintPolicy) -> Self {
        let effective_sni = host.resolve_effective_sni().map(str::to_string);
        let effective_fingerprint = host.resolve_fingerprint(policy).map(str::to_string);
        let routable = host.is_routable(policy);
        Self {
            host,
            effective_sni,
            effective_fingerprint,
            routable,
        }
    }
}
