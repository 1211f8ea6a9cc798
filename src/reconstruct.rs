//! Reads a universe back from the ledger.
//!
//! The node returns object content in a loosely typed shape where every struct
//! is wrapped as `{type, fields: {...}}` and numbers may arrive as strings. All
//! coercion from that shape into [`crate::models`] happens here and nowhere else.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ledger::{LedgerService, ServiceError};
use crate::models::{Galaxy, ObjectId, Planet, Star, Universe};
use crate::plan::MoveTarget;

/// Outcome of reading one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Universe),
    NotFound(ObjectId),
    /// The object exists but is not a well-formed universe.
    Invalid { id: ObjectId, reason: String },
}

impl Lookup {
    pub fn found(&self) -> Option<&Universe> {
        match self {
            Self::Found(universe) => Some(universe),
            _ => None,
        }
    }

    pub fn into_found(self) -> Option<Universe> {
        match self {
            Self::Found(universe) => Some(universe),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Fetches and normalizes universes of one deployed module.
#[derive(Clone)]
pub struct Reconstructor {
    ledger: Arc<dyn LedgerService>,
    target: MoveTarget,
}

impl Reconstructor {
    pub fn new(ledger: Arc<dyn LedgerService>, target: MoveTarget) -> Self {
        Self { ledger, target }
    }

    pub fn target(&self) -> &MoveTarget {
        &self.target
    }

    /// Current state of `id`. Only transport-level failures are errors.
    pub async fn fetch(&self, id: &ObjectId) -> Result<Lookup, ServiceError> {
        let response = self.ledger.get_object(id).await?;
        tracing::debug!(object = %id, payload = %response, "Fetched object");

        let lookup = normalize_object(id, &response, &self.target.universe_type());
        if let Lookup::Invalid { reason, .. } = &lookup {
            tracing::warn!(object = %id, reason = %reason, "Object is not a universe");
        }
        Ok(lookup)
    }
}

/// Normalize a `getObject` response into a [`Lookup`].
pub fn normalize_object(requested: &ObjectId, response: &Value, expected_type: &str) -> Lookup {
    let data = match response.get("data") {
        Some(data) if !data.is_null() => data,
        _ => return Lookup::NotFound(requested.clone()),
    };

    match normalize_universe(data, expected_type) {
        Ok(universe) => Lookup::Found(universe),
        Err(reason) => Lookup::Invalid {
            id: requested.clone(),
            reason,
        },
    }
}

fn normalize_universe(data: &Value, expected_type: &str) -> Result<Universe, String> {
    let content = data.get("content").ok_or("object has no content")?;

    let data_type = content.get("dataType").and_then(Value::as_str);
    if data_type != Some("moveObject") {
        return Err(format!("expected a move object, got {:?}", data_type));
    }
    let object_type = content
        .get("type")
        .or_else(|| data.get("type"))
        .and_then(Value::as_str)
        .ok_or("object has no type")?;
    if object_type != expected_type {
        return Err(format!("expected {}, got {}", expected_type, object_type));
    }

    let fields = unwrap_struct(content)?;
    let id = match data.get("objectId") {
        Some(raw) => parse_id(raw)?,
        None => parse_id(fields.get("id").ok_or("missing field `id`")?)?,
    };
    let galaxies = sequence(fields, "galaxies")?
        .iter()
        .enumerate()
        .map(|(i, g)| normalize_galaxy(g).map_err(|e| format!("galaxies[{}]: {}", i, e)))
        .collect::<Result<_, _>>()?;

    Ok(Universe { id, galaxies })
}

fn normalize_galaxy(value: &Value) -> Result<Galaxy, String> {
    let fields = unwrap_struct(value)?;
    let stars = sequence(fields, "stars")?
        .iter()
        .enumerate()
        .map(|(i, s)| normalize_star(s).map_err(|e| format!("stars[{}]: {}", i, e)))
        .collect::<Result<_, _>>()?;

    Ok(Galaxy {
        name: string_field(fields, "name")?,
        stars,
    })
}

fn normalize_star(value: &Value) -> Result<Star, String> {
    let fields = unwrap_struct(value)?;
    let planets = sequence(fields, "planets")?
        .iter()
        .enumerate()
        .map(|(i, p)| normalize_planet(p).map_err(|e| format!("planets[{}]: {}", i, e)))
        .collect::<Result<_, _>>()?;

    Ok(Star {
        name: string_field(fields, "name")?,
        orbit: orbit_field(fields)?,
        alive: bool_field(fields, "alive")?,
        planets,
    })
}

fn normalize_planet(value: &Value) -> Result<Planet, String> {
    let fields = unwrap_struct(value)?;
    Ok(Planet {
        name: string_field(fields, "name")?,
        orbit: orbit_field(fields)?,
    })
}

/// Peel `{fields: ...}` wrappers until a plain field map remains.
fn unwrap_struct(value: &Value) -> Result<&Map<String, Value>, String> {
    let mut current = value;
    while let Some(inner) = current.get("fields") {
        current = inner;
    }
    current
        .as_object()
        .ok_or_else(|| format!("expected a struct, got {}", current))
}

/// A vector field. Absent or null means empty.
fn sequence<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a [Value], String> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(format!("field `{}` is not a vector: {}", key, other)),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<String, String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing string field `{}`", key))
}

fn bool_field(fields: &Map<String, Value>, key: &str) -> Result<bool, String> {
    fields
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| format!("missing bool field `{}`", key))
}

/// Orbits are `u8` on the ledger; the node may render them as numbers or strings.
fn orbit_field(fields: &Map<String, Value>) -> Result<u8, String> {
    let raw = fields.get("orbit").ok_or("missing field `orbit`")?;
    let value = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    value
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| format!("orbit is not a u8: {}", raw))
}

/// Ids arrive as a bare string or as a `UID` struct (`{id: "0x.."}`), possibly wrapped.
fn parse_id(raw: &Value) -> Result<ObjectId, String> {
    match raw {
        Value::String(s) => s.parse().map_err(|e| format!("bad object id: {}", e)),
        Value::Object(_) => {
            let fields = unwrap_struct(raw)?;
            parse_id(fields.get("id").ok_or("missing field `id`")?)
        }
        other => Err(format!("bad object id: {}", other)),
    }
}
