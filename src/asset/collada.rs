//! Collada (`.dae`) geometry.
//!
//! Only what is needed to display a robot part is read: the `<asset>` metadata (`unit`,
//! `up_axis`), position sources and `<triangles>`/`<polylist>` primitives. Node hierarchies,
//! materials and other vertex attributes are skipped.
//!
//! Some exporters write an empty `<unit meter=""/>` which a strict reader rejects.
//! [repair_empty_unit] rewrites exactly that attribute before parsing.

use super::UpAxis;
use crate::errors::AssetError;
use itertools::Itertools;
use nalgebra::Point3;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, warn};

const UNIT_TAG: &str = "<unit";
const EMPTY_METER: &str = "meter=\"\"";

/// Geometry of a Collada document, positions in document units
#[derive(Debug, Clone, PartialEq)]
pub struct ColladaMesh {
    pub positions: Vec<Point3<f32>>,
    pub faces: Vec<[u32; 3]>,
    /// Meters per document unit
    pub unit: f64,
    pub up_axis: UpAxis,
}

/// Replaces an empty `meter` attribute of `<unit>` elements by `default_unit_scale`. Any other
/// text is left untouched (and nothing is copied if there is nothing to repair).
pub fn repair_empty_unit(text: &str, default_unit_scale: f64) -> Cow<'_, str> {
    let mut repaired = String::new();
    let mut copied = 0;
    let mut search = 0;
    while let Some(found) = text[search..].find(UNIT_TAG) {
        let after = search + found + UNIT_TAG.len();
        let end = text[after..].find('>').map_or(text.len(), |i| after + i);
        search = end;
        // `<unit_of_something` is a different element
        if !text[after..].starts_with(|c: char| c.is_whitespace() || c == '/' || c == '>') {
            continue;
        }
        let tag = &text[after..end];
        let attribute = tag
            .match_indices(EMPTY_METER)
            .map(|(i, _)| i)
            .find(|&i| tag[..i].ends_with(char::is_whitespace));
        if let Some(i) = attribute {
            let at = after + i;
            repaired.push_str(&text[copied..at]);
            repaired.push_str(&format!("meter=\"{default_unit_scale}\""));
            copied = at + EMPTY_METER.len();
            warn!(default_unit_scale, "repaired empty unit attribute");
        }
    }
    if copied == 0 {
        Cow::Borrowed(text)
    } else {
        repaired.push_str(&text[copied..]);
        Cow::Owned(repaired)
    }
}

/// A `<triangles>` or `<polylist>` element
#[derive(Debug, Default)]
struct Primitive {
    polygons: bool,
    stride: usize,
    /// Offset and source of the `VERTEX` input
    vertex: Option<(usize, String)>,
    vcount: Vec<usize>,
    indices: Vec<u32>,
}

/// Parse a Collada document after repairing its unit
pub fn parse(bytes: &[u8], default_unit_scale: f64) -> Result<ColladaMesh, AssetError> {
    let text = std::str::from_utf8(bytes).map_err(|e| AssetError::InvalidCollada(e.to_string()))?;
    let text = repair_empty_unit(text, default_unit_scale);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut unit = 1.0;
    let mut up_axis = UpAxis::default();
    let mut arrays: HashMap<String, Vec<f32>> = HashMap::new();
    let mut vertices: HashMap<String, String> = HashMap::new();
    let mut primitives = vec![];

    let mut source: Option<String> = None;
    let mut vertices_id: Option<String> = None;
    let mut primitive: Option<Primitive> = None;
    let mut content = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                content.clear();
                match e.local_name().as_ref() {
                    b"unit" => unit = parse_unit(e)?,
                    b"source" => source = attribute(e, "id")?,
                    b"vertices" => vertices_id = attribute(e, "id")?,
                    b"triangles" => primitive = Some(Primitive::default()),
                    b"polylist" => {
                        primitive = Some(Primitive {
                            polygons: true,
                            ..Default::default()
                        })
                    }
                    b"input" => {
                        let semantic = attribute(e, "semantic")?.unwrap_or_default();
                        let target = attribute(e, "source")?
                            .map(|s| s.trim_start_matches('#').to_string())
                            .unwrap_or_default();
                        if let Some(id) = &vertices_id {
                            if semantic == "POSITION" {
                                vertices.insert(id.clone(), target);
                            }
                        } else if let Some(primitive) = primitive.as_mut() {
                            let offset = match attribute(e, "offset")? {
                                Some(offset) => offset.trim().parse().map_err(|_| {
                                    AssetError::InvalidCollada(format!("invalid input offset `{offset}`"))
                                })?,
                                None => 0,
                            };
                            primitive.stride = primitive.stride.max(offset + 1);
                            if semantic == "VERTEX" {
                                primitive.vertex = Some((offset, target));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => content.push_str(&String::from_utf8_lossy(&e)),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"up_axis" => up_axis = parse_up_axis(&content),
                b"float_array" => {
                    if let Some(id) = &source {
                        arrays.insert(id.clone(), numbers(&content, "float_array")?);
                    }
                }
                b"vcount" => {
                    if let Some(primitive) = primitive.as_mut() {
                        primitive.vcount = numbers(&content, "vcount")?;
                    }
                }
                b"p" => {
                    if let Some(primitive) = primitive.as_mut() {
                        primitive.indices = numbers(&content, "p")?;
                    }
                }
                b"source" => source = None,
                b"vertices" => vertices_id = None,
                b"triangles" | b"polylist" => primitives.extend(primitive.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let (positions, faces) = assemble(&arrays, &vertices, primitives)?;
    debug!(unit, ?up_axis, positions = positions.len(), faces = faces.len(), "collada parsed");
    Ok(ColladaMesh {
        positions,
        faces,
        unit,
        up_axis,
    })
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, AssetError> {
    match e.try_get_attribute(name).map_err(quick_xml::Error::from)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn parse_unit(e: &BytesStart) -> Result<f64, AssetError> {
    let Some(meter) = attribute(e, "meter")? else {
        return Ok(1.0);
    };
    match meter.trim().parse::<f64>() {
        Ok(unit) if unit.is_finite() && unit > 0.0 => Ok(unit),
        _ => Err(AssetError::InvalidCollada(format!("invalid unit `{meter}`"))),
    }
}

fn parse_up_axis(text: &str) -> UpAxis {
    match text.trim() {
        "X_UP" => UpAxis::X,
        "Y_UP" => UpAxis::Y,
        "Z_UP" => UpAxis::Z,
        other => {
            warn!(up_axis = other, "unknown up axis, assuming Y_UP");
            UpAxis::Y
        }
    }
}

fn numbers<T: std::str::FromStr>(text: &str, element: &str) -> Result<Vec<T>, AssetError> {
    text.split_whitespace()
        .map(|part| {
            part.parse()
                .map_err(|_| AssetError::InvalidCollada(format!("invalid number `{part}` in <{element}>")))
        })
        .collect()
}

/// Collects the positions referenced by the primitives (each source once) and triangulates
fn assemble(
    arrays: &HashMap<String, Vec<f32>>,
    vertices: &HashMap<String, String>,
    primitives: Vec<Primitive>,
) -> Result<(Vec<Point3<f32>>, Vec<[u32; 3]>), AssetError> {
    let mut positions = vec![];
    let mut bases: HashMap<&str, (u32, u32)> = HashMap::new();
    let mut faces = vec![];

    for primitive in primitives {
        let Some((offset, target)) = &primitive.vertex else {
            debug!("primitive without VERTEX input, skipping");
            continue;
        };
        let id = vertices.get(target).unwrap_or(target);
        let Some((array_id, array)) = arrays.get_key_value(id.as_str()) else {
            return Err(AssetError::InvalidCollada(format!("unknown position source `{id}`")));
        };
        let (base, count) = *bases.entry(array_id.as_str()).or_insert_with(|| {
            let base = positions.len() as u32;
            positions.extend(array.chunks_exact(3).map(|c| Point3::new(c[0], c[1], c[2])));
            (base, positions.len() as u32 - base)
        });

        let corners = primitive
            .indices
            .chunks_exact(primitive.stride.max(1))
            .map(|chunk| chunk[*offset])
            .map(|index| {
                if index < count {
                    Ok(base + index)
                } else {
                    Err(AssetError::InvalidCollada(format!("vertex index {index} out of range")))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if primitive.polygons {
            let mut rest = corners.as_slice();
            for &n in &primitive.vcount {
                if n > rest.len() {
                    return Err(AssetError::InvalidCollada("vcount exceeds <p>".to_string()));
                }
                let (polygon, tail) = rest.split_at(n);
                // Fan triangulation around the first corner
                if n >= 3 {
                    faces.extend(polygon[1..].iter().tuple_windows().map(|(&b, &c)| [polygon[0], b, c]));
                }
                rest = tail;
            }
        } else {
            faces.extend(corners.chunks_exact(3).map(|c| [c[0], c[1], c[2]]));
        }
    }
    Ok((positions, faces))
}
