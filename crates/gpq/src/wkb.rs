//! ISO WKB codec restricted to polygonal geometries.
//!
//! Encoding always emits little-endian 2D WKB: a single-part multipolygon is
//! written as `Polygon` (type 3), everything else as `MultiPolygon` (type 6).
//!
//! Decoding accepts either byte order, ISO dimension offsets (1000/2000/3000)
//! and EWKB Z/M/SRID flags. Extra ordinates are dropped.

use geo_types::{Coord, LineString, MultiPolygon, Polygon};

use crate::error::{GpqError, Result};

const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOLYGON: u32 = 6;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

/// Encode a multipolygon as little-endian ISO WKB.
pub fn encode(geometry: &MultiPolygon<f64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(geometry));

    if geometry.0.len() == 1 {
        write_polygon(&mut out, &geometry.0[0]);
    } else {
        write_header(&mut out, WKB_MULTIPOLYGON);
        write_u32(&mut out, geometry.0.len() as u32);

        for polygon in &geometry.0 {
            write_polygon(&mut out, polygon);
        }
    }

    out
}

/// Decode a `Polygon` or `MultiPolygon` WKB blob.
///
/// A polygon is returned as a single-part multipolygon so callers handle
/// exactly one shape type.
pub fn decode(bytes: &[u8]) -> Result<MultiPolygon<f64>> {
    let mut reader = Reader::new(bytes);
    let (kind, dims) = reader.header()?;

    let geometry = match kind {
        WKB_POLYGON => MultiPolygon::new(vec![reader.polygon_body(dims)?]),
        WKB_MULTIPOLYGON => {
            let count = reader.u32()? as usize;
            let mut polygons = Vec::with_capacity(count.min(1 << 16));

            for _ in 0..count {
                let (inner, inner_dims) = reader.header()?;
                if inner != WKB_POLYGON {
                    return Err(bad(format!("multipolygon member has type {inner}")));
                }
                polygons.push(reader.polygon_body(inner_dims)?);
            }

            MultiPolygon::new(polygons)
        }
        other => return Err(bad(format!("unsupported geometry type {other}"))),
    };

    if !reader.buf.is_empty() {
        return Err(bad(format!("{} trailing bytes", reader.buf.len())));
    }

    Ok(geometry)
}

fn encoded_len(geometry: &MultiPolygon<f64>) -> usize {
    let polygon_bytes = |p: &Polygon<f64>| {
        13 + std::iter::once(p.exterior())
            .chain(p.interiors())
            .map(|ring| 4 + ring.0.len() * 16)
            .sum::<usize>()
    };

    match geometry.0.as_slice() {
        [single] => polygon_bytes(single),
        parts => 13 + parts.iter().map(polygon_bytes).sum::<usize>(),
    }
}

#[inline]
fn write_header(out: &mut Vec<u8>, kind: u32) {
    out.push(1); // little-endian
    write_u32(out, kind);
}

fn write_polygon(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    write_header(out, WKB_POLYGON);

    // An empty exterior encodes as a polygon with zero rings.
    if polygon.exterior().0.is_empty() {
        write_u32(out, 0);
        return;
    }

    write_u32(out, 1 + polygon.interiors().len() as u32);
    write_ring(out, polygon.exterior());

    for ring in polygon.interiors() {
        write_ring(out, ring);
    }
}

fn write_ring(out: &mut Vec<u8>, ring: &LineString<f64>) {
    write_u32(out, ring.0.len() as u32);

    for c in &ring.0 {
        out.extend_from_slice(&c.x.to_le_bytes());
        out.extend_from_slice(&c.y.to_le_bytes());
    }
}

#[inline]
fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[cold]
fn bad(msg: String) -> GpqError {
    GpqError::Wkb(msg)
}

struct Reader<'a> {
    buf: &'a [u8],
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            big_endian: false,
        }
    }

    #[inline(always)]
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(bad("truncated WKB".to_owned()));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    #[inline(always)]
    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        let b = [b[0], b[1], b[2], b[3]];
        Ok(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    #[inline(always)]
    fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        let b = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        Ok(if self.big_endian {
            f64::from_be_bytes(b)
        } else {
            f64::from_le_bytes(b)
        })
    }

    /// Reads byte order + type code; returns the base type and the number of
    /// ordinates per coordinate.
    fn header(&mut self) -> Result<(u32, usize)> {
        self.big_endian = match self.take(1)?[0] {
            0 => true,
            1 => false,
            x => return Err(bad(format!("bad byte order marker {x}"))),
        };

        let raw = self.u32()?;

        let mut extra = 0usize;
        if raw & EWKB_Z != 0 {
            extra += 1;
        }
        if raw & EWKB_M != 0 {
            extra += 1;
        }
        if raw & EWKB_SRID != 0 {
            self.u32()?;
        }

        let code = raw & 0x0FFF_FFFF;
        extra += match code / 1000 {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            d => return Err(bad(format!("bad dimension prefix {d}"))),
        };

        Ok((code % 1000, 2 + extra))
    }

    fn polygon_body(&mut self, dims: usize) -> Result<Polygon<f64>> {
        let ring_count = self.u32()? as usize;
        if ring_count == 0 {
            return Ok(Polygon::new(LineString::new(vec![]), vec![]));
        }

        let exterior = self.ring(dims)?;

        // Every ring needs at least its 4-byte point count.
        if ring_count - 1 > self.buf.len() / 4 {
            return Err(bad(format!("{ring_count} rings do not fit in the blob")));
        }
        let mut interiors = Vec::with_capacity((ring_count - 1).min(1 << 16));
        for _ in 1..ring_count {
            interiors.push(self.ring(dims)?);
        }

        Ok(Polygon::new(exterior, interiors))
    }

    fn ring(&mut self, dims: usize) -> Result<LineString<f64>> {
        let count = self.u32()? as usize;
        let bytes = count
            .checked_mul(dims * 8)
            .ok_or_else(|| bad("ring size overflow".to_owned()))?;
        if self.buf.len() < bytes {
            return Err(bad("truncated WKB ring".to_owned()));
        }

        let mut coords = Vec::with_capacity(count);
        for _ in 0..count {
            let x = self.f64()?;
            let y = self.f64()?;
            for _ in 2..dims {
                self.f64()?;
            }
            coords.push(Coord { x, y });
        }

        Ok(LineString::new(coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn square_with_hole() -> Polygon<f64> {
        polygon!(
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 4.0, y: 0.0),
                (x: 4.0, y: 4.0),
                (x: 0.0, y: 4.0),
                (x: 0.0, y: 0.0),
            ],
            interiors: [[
                (x: 1.0, y: 1.0),
                (x: 1.0, y: 2.0),
                (x: 2.0, y: 2.0),
                (x: 2.0, y: 1.0),
                (x: 1.0, y: 1.0),
            ]],
        )
    }

    #[test]
    fn single_part_is_written_as_polygon() {
        let mp = MultiPolygon::new(vec![square_with_hole()]);
        let bytes = encode(&mp);

        assert_eq!(bytes[0], 1);
        assert_eq!(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), WKB_POLYGON);
        // header + ring count + 2 rings of 5 points
        assert_eq!(bytes.len(), 9 + 4 + 2 * (4 + 5 * 16));
        assert_eq!(decode(&bytes).unwrap(), mp);
    }

    #[test]
    fn holes_and_parts_survive() {
        let other = polygon![
            (x: 10.0, y: 10.0),
            (x: 11.0, y: 10.0),
            (x: 11.0, y: 11.0),
            (x: 10.0, y: 10.0),
        ];
        let mp = MultiPolygon::new(vec![square_with_hole(), other]);
        let bytes = encode(&mp);

        assert_eq!(bytes.len(), encoded_len(&mp));
        assert_eq!(decode(&bytes).unwrap(), mp);
    }

    #[test]
    fn big_endian_polygon_with_z_is_flattened() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&1003u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes());
        for (x, y) in [(0.0f64, 0.0f64), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)] {
            bytes.extend_from_slice(&x.to_be_bytes());
            bytes.extend_from_slice(&y.to_be_bytes());
            bytes.extend_from_slice(&7.5f64.to_be_bytes());
        }

        let mp = decode(&bytes).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].exterior().0[1], Coord { x: 1.0, y: 0.0 });
    }

    #[test]
    fn rejects_points_and_truncation() {
        let mut point = vec![1u8];
        point.extend_from_slice(&1u32.to_le_bytes());
        point.extend_from_slice(&0f64.to_le_bytes());
        point.extend_from_slice(&0f64.to_le_bytes());
        assert!(matches!(decode(&point), Err(GpqError::Wkb(_))));

        let bytes = encode(&MultiPolygon::new(vec![square_with_hole()]));
        assert!(decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn oversized_ring_count_is_an_error() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&WKB_POLYGON.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        for (x, y) in [(0.0f64, 0.0f64), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)] {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 4]);

        assert!(matches!(decode(&bytes), Err(GpqError::Wkb(_))));
    }
}
