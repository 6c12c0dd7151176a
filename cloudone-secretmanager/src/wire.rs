//! Wire JSON encoding of Secret Manager messages
//!
//! Mirrors the protobuf JSON mapping used by the Google REST API: lowerCamelCase
//! field names (the proto field names are accepted too), RFC 3339
//! timestamps, base64 bytes and 64-bit integers as strings. Unknown fields
//! are rejected.
//!
//! The same encoding is used for the secret metadata files on disk.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use prost_types::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::proto::{
    replication, secret_version, ListSecretsResponse, Replication, Secret, SecretPayload,
    SecretVersion,
};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct WireError(String);

impl WireError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Decode a request body; an empty body is treated as `{}`
pub fn decode_body<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, WireError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| WireError::new(e.to_string()))
}

pub fn format_timestamp(ts: &Timestamp) -> Result<String, WireError> {
    let nanos = u32::try_from(ts.nanos).map_err(|_| WireError::new("negative timestamp nanos"))?;
    DateTime::<Utc>::from_timestamp(ts.seconds, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .ok_or_else(|| WireError::new(format!("timestamp out of range: {}", ts.seconds)))
}

pub fn parse_timestamp(value: &str) -> Result<Timestamp, WireError> {
    let dt = DateTime::parse_from_rfc3339(value)
        .map_err(|e| WireError::new(format!("invalid timestamp {value:?}: {e}")))?;
    Ok(Timestamp {
        seconds: dt.timestamp(),
        nanos: i32::try_from(dt.timestamp_subsec_nanos()).unwrap_or(0),
    })
}

fn decode_bytes(value: &str) -> Result<Vec<u8>, WireError> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(value).ok())
        .ok_or_else(|| WireError::new("invalid base64 in bytes field"))
}

/// int64 fields arrive either as a JSON string or a JSON number
fn int64_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Number(n)) => Ok(Some(n)),
        Some(Int64::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationJson>,
    #[serde(default, alias = "create_time", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReplicationJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<AutomaticJson>,
    #[serde(default, alias = "user_managed", skip_serializing_if = "Option::is_none")]
    pub user_managed: Option<UserManagedJson>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutomaticJson {}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserManagedJson {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicaJson>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicaJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
}

impl TryFrom<SecretJson> for Secret {
    type Error = WireError;

    fn try_from(json: SecretJson) -> Result<Self, Self::Error> {
        let replication = match json.replication {
            None => None,
            Some(ReplicationJson {
                automatic: Some(_),
                user_managed: Some(_),
            }) => {
                return Err(WireError::new(
                    "replication: only one of automatic or userManaged may be set",
                ))
            }
            Some(ReplicationJson {
                automatic: Some(_), ..
            }) => Some(Replication {
                replication: Some(replication::Replication::Automatic(
                    replication::Automatic {},
                )),
            }),
            Some(ReplicationJson {
                user_managed: Some(managed),
                ..
            }) => Some(Replication {
                replication: Some(replication::Replication::UserManaged(
                    replication::UserManaged {
                        replicas: managed
                            .replicas
                            .into_iter()
                            .map(|r| replication::user_managed::Replica {
                                location: r.location,
                            })
                            .collect(),
                    },
                )),
            }),
            Some(ReplicationJson { .. }) => Some(Replication { replication: None }),
        };

        Ok(Secret {
            name: json.name,
            replication,
            create_time: json.create_time.as_deref().map(parse_timestamp).transpose()?,
            labels: json.labels.into_iter().collect(),
            etag: json.etag,
            annotations: json.annotations.into_iter().collect(),
        })
    }
}

impl TryFrom<&Secret> for SecretJson {
    type Error = WireError;

    fn try_from(secret: &Secret) -> Result<Self, Self::Error> {
        let replication = secret.replication.as_ref().map(|r| match &r.replication {
            Some(replication::Replication::Automatic(_)) => ReplicationJson {
                automatic: Some(AutomaticJson {}),
                user_managed: None,
            },
            Some(replication::Replication::UserManaged(managed)) => ReplicationJson {
                automatic: None,
                user_managed: Some(UserManagedJson {
                    replicas: managed
                        .replicas
                        .iter()
                        .map(|r| ReplicaJson {
                            location: r.location.clone(),
                        })
                        .collect(),
                }),
            },
            None => ReplicationJson::default(),
        });

        Ok(Self {
            name: secret.name.clone(),
            replication,
            create_time: secret.create_time.as_ref().map(format_timestamp).transpose()?,
            labels: secret.labels.clone().into_iter().collect(),
            etag: secret.etag.clone(),
            annotations: secret.annotations.clone().into_iter().collect(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVersionJson {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroy_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

impl TryFrom<&SecretVersion> for SecretVersionJson {
    type Error = WireError;

    fn try_from(version: &SecretVersion) -> Result<Self, Self::Error> {
        let state = secret_version::State::try_from(version.state)
            .unwrap_or(secret_version::State::Unspecified);
        Ok(Self {
            name: version.name.clone(),
            create_time: version.create_time.as_ref().map(format_timestamp).transpose()?,
            destroy_time: version.destroy_time.as_ref().map(format_timestamp).transpose()?,
            state: (state != secret_version::State::Unspecified).then(|| state.as_str_name()),
            etag: version.etag.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSecretsResponseJson {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretJson>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub next_page_token: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_size: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl TryFrom<&ListSecretsResponse> for ListSecretsResponseJson {
    type Error = WireError;

    fn try_from(response: &ListSecretsResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            secrets: response
                .secrets
                .iter()
                .map(SecretJson::try_from)
                .collect::<Result<_, _>>()?,
            next_page_token: response.next_page_token.clone(),
            total_size: response.total_size,
        })
    }
}

/// Body of `POST .../secrets/{secret}:addVersion`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddSecretVersionJson {
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub payload: Option<SecretPayloadJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretPayloadJson {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, alias = "data_crc32c", deserialize_with = "int64_opt")]
    pub data_crc32c: Option<i64>,
}

impl TryFrom<SecretPayloadJson> for SecretPayload {
    type Error = WireError;

    fn try_from(json: SecretPayloadJson) -> Result<Self, Self::Error> {
        Ok(SecretPayload {
            data: json.data.as_deref().map(decode_bytes).transpose()?.unwrap_or_default(),
            data_crc32c: json.data_crc32c,
        })
    }
}
