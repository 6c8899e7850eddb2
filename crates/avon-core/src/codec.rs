//! Canonical JSON encoding of trees, PVA, geometry and interface payloads
//!
//! Every resource served by Avon is rendered through this module so there
//! is exactly one description of the wire schema. Real numbers are rounded
//! to three decimal places and times are integer microseconds.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{
    Bounds, Geom, InterfaceType, Payload, Pva, RangerCfg, RangerData, Sample,
    RANGER_SAMPLES_MAX, RANGER_TRANSDUCERS_MAX,
};
use crate::registry::TreeView;

/// Media type of every encoded body
pub const CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected shape: {0}")]
    Shape(String),
    #[error("Cannot format {found} payload as {expected}")]
    UnexpectedPayload {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{what} count {count} exceeds limit of {max}")]
    Limit {
        what: &'static str,
        count: usize,
        max: usize,
    },
}

fn shape(msg: impl Into<String>) -> CodecError {
    CodecError::Shape(msg.into())
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn round_all<const N: usize>(v: &[f64; N]) -> [f64; N] {
    v.map(round3)
}

#[derive(Serialize)]
struct PvaWire {
    time: u64,
    pva: [[f64; 6]; 3],
}

#[derive(Serialize)]
struct GeomBody {
    pose: [f64; 6],
    extent: [f64; 3],
}

impl GeomBody {
    fn from_geom(g: &Geom) -> Self {
        Self {
            pose: round_all(&g.pose),
            extent: round_all(&g.extent),
        }
    }
}

#[derive(Serialize)]
struct GeomWire {
    time: u64,
    geom: GeomBody,
}

#[derive(Serialize)]
struct TransducerDataWire {
    pose: [f64; 6],
    sample_count: usize,
    samples: Vec<[f64; 4]>,
}

#[derive(Serialize)]
struct TransducerCfgWire {
    geom: GeomBody,
    fov: [Bounds; 3],
}

#[derive(Serialize)]
struct RangerWire<T> {
    time: u64,
    #[serde(rename = "type")]
    interface: InterfaceType,
    transducer_count: usize,
    transducers: Vec<T>,
}

/// Render a registry tree as nested objects
pub fn encode_tree(view: &TreeView) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(view)?)
}

/// Render a PVA as time plus three 6-element arrays
pub fn encode_pva(pva: &Pva) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(PvaWire {
        time: pva.time,
        pva: [round_all(&pva.p), round_all(&pva.v), round_all(&pva.a)],
    })?)
}

/// Render a geometry as time plus pose and extent
pub fn encode_geom(geom: &Geom) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(GeomWire {
        time: geom.time,
        geom: GeomBody::from_geom(geom),
    })?)
}

/// Render the simulation clock
pub fn encode_clock(time: u64) -> Value {
    serde_json::json!({ "time": time })
}

/// Parse a PVA from a request body.
///
/// Accepts `{"time": t, "pva": [[p], [v], [a]]}` as produced by
/// [`encode_pva`], or the split form `{"time": t, "p": [..], "v": [..], "a": [..]}`.
/// A missing time decodes as zero.
pub fn decode_pva(body: &[u8]) -> Result<Pva, CodecError> {
    let value: Value = serde_json::from_slice(body)?;
    let obj = value
        .as_object()
        .ok_or_else(|| shape("PVA must be a JSON object"))?;

    let time = match obj.get("time") {
        None | Some(Value::Null) => 0,
        Some(t) => t
            .as_u64()
            .ok_or_else(|| shape("time must be a non-negative integer of microseconds"))?,
    };

    let (p, v, a) = match obj.get("pva") {
        Some(pva) => {
            let rows = pva
                .as_array()
                .ok_or_else(|| shape("pva must be an array of 3 arrays"))?;
            if rows.len() != 3 {
                return Err(shape(format!("pva must have 3 rows, found {}", rows.len())));
            }
            (
                vector(&rows[0], "pva[0]")?,
                vector(&rows[1], "pva[1]")?,
                vector(&rows[2], "pva[2]")?,
            )
        }
        None => (
            vector(field(obj, "p")?, "p")?,
            vector(field(obj, "v")?, "v")?,
            vector(field(obj, "a")?, "a")?,
        ),
    };

    Ok(Pva { time, p, v, a })
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Value, CodecError> {
    obj.get(key)
        .ok_or_else(|| shape(format!("missing field \"{}\"", key)))
}

fn vector<const N: usize>(value: &Value, name: &str) -> Result<[f64; N], CodecError> {
    let items = value
        .as_array()
        .ok_or_else(|| shape(format!("{} must be an array", name)))?;
    if items.len() != N {
        return Err(shape(format!(
            "{} must have {} elements, found {}",
            name,
            N,
            items.len()
        )));
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| shape(format!("{} must contain only numbers", name)))?;
    }
    Ok(out)
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::RangerData(_) => "ranger data",
        Payload::RangerCfg(_) => "ranger cfg",
        Payload::Json(_) => "json",
    }
}

fn check_limit(what: &'static str, count: usize, max: usize) -> Result<(), CodecError> {
    if count > max {
        return Err(CodecError::Limit { what, count, max });
    }
    Ok(())
}

/// Data formatter for ranger models
pub fn format_ranger_data(sample: &Sample) -> Result<Value, CodecError> {
    let data: &RangerData = match &sample.payload {
        Payload::RangerData(d) => d,
        other => {
            return Err(CodecError::UnexpectedPayload {
                expected: "ranger data",
                found: payload_kind(other),
            })
        }
    };
    check_limit("transducer", data.transducers.len(), RANGER_TRANSDUCERS_MAX)?;

    let mut transducers = Vec::with_capacity(data.transducers.len());
    for t in &data.transducers {
        check_limit("sample", t.samples.len(), RANGER_SAMPLES_MAX)?;
        transducers.push(TransducerDataWire {
            pose: round_all(&t.pose),
            sample_count: t.samples.len(),
            samples: t.samples.iter().map(|s| round_all(s)).collect(),
        });
    }

    Ok(serde_json::to_value(RangerWire {
        time: sample.time,
        interface: InterfaceType::Ranger,
        transducer_count: transducers.len(),
        transducers,
    })?)
}

/// Cfg formatter for ranger models
pub fn format_ranger_cfg(sample: &Sample) -> Result<Value, CodecError> {
    let cfg: &RangerCfg = match &sample.payload {
        Payload::RangerCfg(c) => c,
        other => {
            return Err(CodecError::UnexpectedPayload {
                expected: "ranger cfg",
                found: payload_kind(other),
            })
        }
    };
    check_limit("transducer", cfg.transducers.len(), RANGER_TRANSDUCERS_MAX)?;

    let transducers: Vec<_> = cfg
        .transducers
        .iter()
        .map(|t| TransducerCfgWire {
            geom: GeomBody::from_geom(&t.geom),
            fov: t.fov.map(|b| Bounds {
                min: round3(b.min),
                max: round3(b.max),
            }),
        })
        .collect();

    Ok(serde_json::to_value(RangerWire {
        time: sample.time,
        interface: InterfaceType::Ranger,
        transducer_count: transducers.len(),
        transducers,
    })?)
}

/// Formatter for interfaces whose backend hands over ready-made JSON
pub fn format_raw(sample: &Sample) -> Result<Value, CodecError> {
    match &sample.payload {
        Payload::Json(value) => Ok(serde_json::json!({
            "time": sample.time,
            "type": sample.interface,
            "payload": value,
        })),
        other => Err(CodecError::UnexpectedPayload {
            expected: "json",
            found: payload_kind(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RangerTransducerData, Transducer};
    use serde_json::json;

    #[test]
    fn test_pva_reencodes_identically() {
        let body = br#"{"time": 1234567, "p": [0,0,0,0,0,0], "v": [1,0,0,0,0,0], "a": [0,0,0,0,0,0]}"#;
        let pva = decode_pva(body).unwrap();
        assert_eq!(pva.time, 1_234_567);
        assert_eq!(pva.v, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let encoded = encode_pva(&pva).unwrap();
        assert_eq!(
            encoded,
            json!({
                "time": 1234567,
                "pva": [
                    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                    [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
                ]
            })
        );

        // The canonical form decodes back to the same value
        let text = serde_json::to_vec(&encoded).unwrap();
        let again = decode_pva(&text).unwrap();
        assert_eq!(again, pva);
        assert_eq!(encode_pva(&again).unwrap(), encoded);
    }

    #[test]
    fn test_pva_rounds_to_millis() {
        let pva = Pva {
            time: 5,
            p: [1.23456, -0.0004, 0.0, 0.0, 0.0, 3.14159],
            ..Default::default()
        };
        let encoded = encode_pva(&pva).unwrap();
        assert_eq!(encoded["pva"][0][0], json!(1.235));
        assert_eq!(encoded["pva"][0][5], json!(3.142));
    }

    #[test]
    fn test_decode_pva_rejects_bad_shapes() {
        let short = br#"{"time": 1, "pva": [[0,0,0,0,0,0],[0,0,0,0,0,0]]}"#;
        assert!(matches!(decode_pva(short), Err(CodecError::Shape(_))));

        let narrow = br#"{"time": 1, "pva": [[0,0,0],[0,0,0,0,0,0],[0,0,0,0,0,0]]}"#;
        assert!(matches!(decode_pva(narrow), Err(CodecError::Shape(_))));

        let missing = br#"{"time": 1, "p": [0,0,0,0,0,0], "v": [0,0,0,0,0,0]}"#;
        assert!(matches!(decode_pva(missing), Err(CodecError::Shape(_))));

        let text = br#"{"p": ["a",0,0,0,0,0], "v": [0,0,0,0,0,0], "a": [0,0,0,0,0,0]}"#;
        assert!(matches!(decode_pva(text), Err(CodecError::Shape(_))));

        let negative_time = br#"{"time": -3, "p": [0,0,0,0,0,0], "v": [0,0,0,0,0,0], "a": [0,0,0,0,0,0]}"#;
        assert!(matches!(decode_pva(negative_time), Err(CodecError::Shape(_))));

        assert!(matches!(decode_pva(b"not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode_pva(b"[1,2,3]"), Err(CodecError::Shape(_))));
    }

    #[test]
    fn test_decode_pva_without_time() {
        let body = br#"{"pva": [[1,2,3,0,0,0],[0,0,0,0,0,0],[0,0,0,0,0,0]]}"#;
        let pva = decode_pva(body).unwrap();
        assert_eq!(pva.time, 0);
        assert_eq!(pva.p[2], 3.0);
    }

    #[test]
    fn test_encode_geom() {
        let geom = Geom {
            time: 42,
            pose: [1.0, 2.0, 0.0, 0.0, 0.0, 1.5708],
            extent: [0.5, 0.4, 0.25],
        };
        assert_eq!(
            encode_geom(&geom).unwrap(),
            json!({
                "time": 42,
                "geom": {
                    "pose": [1.0, 2.0, 0.0, 0.0, 0.0, 1.571],
                    "extent": [0.5, 0.4, 0.25]
                }
            })
        );
    }

    #[test]
    fn test_format_ranger_data() {
        let sample = Sample {
            time: 100,
            interface: InterfaceType::Ranger,
            payload: Payload::RangerData(RangerData {
                transducers: vec![RangerTransducerData {
                    pose: [0.1, 0.0, 0.2, 0.0, 0.0, 0.0],
                    samples: vec![[-0.5, 0.0, 2.0, 1.0], [0.5, 0.0, 8.0, 0.0]],
                }],
            }),
        };
        assert_eq!(
            format_ranger_data(&sample).unwrap(),
            json!({
                "time": 100,
                "type": "ranger",
                "transducer_count": 1,
                "transducers": [{
                    "pose": [0.1, 0.0, 0.2, 0.0, 0.0, 0.0],
                    "sample_count": 2,
                    "samples": [[-0.5, 0.0, 2.0, 1.0], [0.5, 0.0, 8.0, 0.0]]
                }]
            })
        );
    }

    #[test]
    fn test_format_ranger_data_limits() {
        let sample = Sample {
            time: 0,
            interface: InterfaceType::Ranger,
            payload: Payload::RangerData(RangerData {
                transducers: vec![RangerTransducerData::default(); RANGER_TRANSDUCERS_MAX + 1],
            }),
        };
        assert!(matches!(
            format_ranger_data(&sample),
            Err(CodecError::Limit { what: "transducer", .. })
        ));
    }

    #[test]
    fn test_format_ranger_cfg() {
        let sample = Sample {
            time: 7,
            interface: InterfaceType::Ranger,
            payload: Payload::RangerCfg(RangerCfg {
                transducers: vec![Transducer {
                    geom: Geom {
                        time: 7,
                        pose: [0.0; 6],
                        extent: [0.05, 0.05, 0.05],
                    },
                    fov: [
                        Bounds { min: -1.5708, max: 1.5708 },
                        Bounds { min: 0.0, max: 0.0 },
                        Bounds { min: 0.0, max: 8.0 },
                    ],
                }],
            }),
        };
        let json = format_ranger_cfg(&sample).unwrap();
        assert_eq!(json["transducer_count"], json!(1));
        assert_eq!(json["transducers"][0]["fov"][0], json!({"min": -1.571, "max": 1.571}));
        assert_eq!(json["transducers"][0]["geom"]["extent"], json!([0.05, 0.05, 0.05]));
    }

    #[test]
    fn test_formatter_rejects_wrong_payload() {
        let sample = Sample {
            time: 0,
            interface: InterfaceType::Ranger,
            payload: Payload::Json(json!({})),
        };
        assert!(matches!(
            format_ranger_data(&sample),
            Err(CodecError::UnexpectedPayload { expected: "ranger data", found: "json" })
        ));
        assert!(format_ranger_cfg(&sample).is_err());
    }

    #[test]
    fn test_format_raw() {
        let sample = Sample {
            time: 9,
            interface: InterfaceType::Fiducial,
            payload: Payload::Json(json!({"fiducials": [{"id": 3, "range": 1.5}]})),
        };
        assert_eq!(
            format_raw(&sample).unwrap(),
            json!({
                "time": 9,
                "type": "fiducial",
                "payload": {"fiducials": [{"id": 3, "range": 1.5}]}
            })
        );
    }
}
