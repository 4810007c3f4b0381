//! STL (Stereolithography) parsing from memory.
//!
//! ASCII files start with `solid`. Binary files have an 80-byte header (which may also start with
//! `solid`), a little-endian `u32` triangle count and 50 bytes per triangle: normal, three
//! vertices (`f32` each) and an unused attribute count.

use crate::errors::AssetError;
use nalgebra::Point3;

const HEADER_SIZE: usize = 80;
const TRIANGLE_SIZE: usize = 50;

/// Vertices (three per triangle, not deduplicated) and faces
pub fn parse(bytes: &[u8]) -> Result<(Vec<Point3<f32>>, Vec<[u32; 3]>), AssetError> {
    if is_ascii(bytes) {
        parse_ascii(bytes)
    } else {
        parse_binary(bytes)
    }
}

fn is_ascii(bytes: &[u8]) -> bool {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    if !bytes[start..].starts_with(b"solid") {
        return false;
    }
    // Binary exporters sometimes write `solid` into the header
    if bytes.len() >= HEADER_SIZE + 4 {
        let binary_size = HEADER_SIZE + 4 + triangle_count(bytes) * TRIANGLE_SIZE;
        if bytes[..HEADER_SIZE].contains(&0) || binary_size == bytes.len() {
            return false;
        }
    }
    true
}

fn triangle_count(bytes: &[u8]) -> usize {
    let mut count = [0u8; 4];
    count.copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + 4]);
    u32::from_le_bytes(count) as usize
}

fn parse_binary(bytes: &[u8]) -> Result<(Vec<Point3<f32>>, Vec<[u32; 3]>), AssetError> {
    if bytes.len() < HEADER_SIZE + 4 {
        return Err(AssetError::InvalidStl(format!(
            "expected at least {} bytes, got {}",
            HEADER_SIZE + 4,
            bytes.len()
        )));
    }
    let count = triangle_count(bytes);
    let body = &bytes[HEADER_SIZE + 4..];
    if body.len() < count * TRIANGLE_SIZE {
        return Err(AssetError::InvalidStl(format!(
            "header announces {count} triangles, data holds {}",
            body.len() / TRIANGLE_SIZE
        )));
    }

    let mut vertices = Vec::with_capacity(count * 3);
    let mut faces = Vec::with_capacity(count);
    for triangle in body.chunks_exact(TRIANGLE_SIZE).take(count) {
        // Skip the normal
        let base = vertices.len() as u32;
        vertices.extend(triangle[12..48].chunks_exact(12).map(read_vertex));
        faces.push([base, base + 1, base + 2]);
    }
    Ok((vertices, faces))
}

fn read_vertex(buf: &[u8]) -> Point3<f32> {
    let coordinate = |i: usize| f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
    Point3::new(coordinate(0), coordinate(4), coordinate(8))
}

fn parse_ascii(bytes: &[u8]) -> Result<(Vec<Point3<f32>>, Vec<[u32; 3]>), AssetError> {
    let text = std::str::from_utf8(bytes).map_err(|e| AssetError::InvalidStl(e.to_string()))?;
    let mut vertices = vec![];
    let mut faces = vec![];
    let mut corners: Vec<Point3<f32>> = Vec::with_capacity(3);
    let mut in_loop = false;

    for (number, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("outer") => {
                in_loop = true;
                corners.clear();
            }
            Some("vertex") if in_loop => {
                let mut coordinate = || -> Result<f32, AssetError> {
                    parts
                        .next()
                        .and_then(|p| p.parse().ok())
                        .ok_or_else(|| AssetError::InvalidStl(format!("malformed vertex in line {}", number + 1)))
                };
                let (x, y, z) = (coordinate()?, coordinate()?, coordinate()?);
                corners.push(Point3::new(x, y, z));
            }
            Some("endloop") => in_loop = false,
            Some("endfacet") => {
                // Facets that are not triangles are dropped
                if corners.len() == 3 {
                    let base = vertices.len() as u32;
                    vertices.append(&mut corners);
                    faces.push([base, base + 1, base + 2]);
                }
                corners.clear();
            }
            Some("endsolid") => break,
            _ => {}
        }
    }
    Ok((vertices, faces))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A binary STL holding one triangle, header starting with `solid`
    pub(crate) fn binary_triangle() -> Vec<u8> {
        let mut bytes = b"solid exported by a binary writer".to_vec();
        bytes.resize(HEADER_SIZE, b' ');
        bytes.extend(1u32.to_le_bytes());
        for value in [0.0f32, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend(value.to_le_bytes());
        }
        bytes.extend([0u8, 0]);
        bytes
    }

    #[test_log::test]
    fn test_binary() {
        let (vertices, faces) = parse(&binary_triangle()).unwrap();
        assert_eq!(vertices, &[Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)]);
        assert_eq!(faces, &[[0, 1, 2]]);
    }

    #[test_log::test]
    fn test_truncated_binary() {
        let mut bytes = binary_triangle();
        bytes[HEADER_SIZE - 1] = 0;
        bytes.truncate(100);
        assert!(matches!(parse(&bytes), Err(AssetError::InvalidStl(_))));
    }

    #[test_log::test]
    fn test_ascii() {
        let text = b"solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
  FACET NORMAL 0 0 1
    OUTER LOOP
      VERTEX 1 0 0
      VERTEX 1 1 0
      VERTEX 0 1 0
    ENDLOOP
  ENDFACET
endsolid test";
        let (vertices, faces) = parse(text).unwrap();
        assert_eq!(vertices.len(), 6);
        assert_eq!(faces, &[[0, 1, 2], [3, 4, 5]]);
        assert_eq!(vertices[4], Point3::new(1.0, 1.0, 0.0));
    }

    #[test_log::test]
    fn test_ascii_malformed_vertex() {
        let text = b"solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 zero 0\n";
        assert!(matches!(parse(text), Err(AssetError::InvalidStl(_))));
    }
}
