//! Well-known binary codec, ISO and extended (PostGIS) flavors.

use super::model::{Coords, Shape};
use super::{CodecId, CodecNode, Engine, GeomId, WkbSettings};
use crate::types::{ByteOrder, GeometryTypeId, WkbFlavor};
use bytes::{Buf, BufMut, BytesMut};

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

const UNEXPECTED_EOF: &str = "ParseException: Unexpected EOF parsing WKB";

fn wkb_code(type_id: GeometryTypeId) -> u32 {
    match type_id {
        GeometryTypeId::Point => 1,
        GeometryTypeId::LineString | GeometryTypeId::LinearRing => 2,
        GeometryTypeId::Polygon => 3,
        GeometryTypeId::MultiPoint => 4,
        GeometryTypeId::MultiLineString => 5,
        GeometryTypeId::MultiPolygon => 6,
        GeometryTypeId::GeometryCollection => 7,
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    little: bool,
}

impl Reader<'_> {
    fn need(&self, bytes: usize) -> Result<(), String> {
        if self.buf.remaining() < bytes {
            return Err(UNEXPECTED_EOF.into());
        }
        Ok(())
    }

    fn byte_order(&mut self) -> Result<(), String> {
        self.need(1)?;
        self.little = match self.buf.get_u8() {
            0 => false,
            1 => true,
            other => return Err(format!("ParseException: Invalid byte order {other}")),
        };
        Ok(())
    }

    fn u32(&mut self) -> Result<u32, String> {
        self.need(4)?;
        Ok(if self.little {
            self.buf.get_u32_le()
        } else {
            self.buf.get_u32()
        })
    }

    fn f64(&mut self) -> Result<f64, String> {
        self.need(8)?;
        Ok(if self.little {
            self.buf.get_f64_le()
        } else {
            self.buf.get_f64()
        })
    }

    /// Element count, rejected when the remaining input cannot hold it.
    fn count(&mut self, min_element: usize) -> Result<usize, String> {
        let n = self.u32()? as usize;
        if n.saturating_mul(min_element) > self.buf.remaining() {
            return Err(UNEXPECTED_EOF.into());
        }
        Ok(n)
    }

    fn coords(&mut self, n: usize, has_z: bool, has_m: bool) -> Result<Coords, String> {
        let dims: u8 = match (has_z, has_m) {
            (false, false) => 2,
            (true, false) => 3,
            _ => 4,
        };
        let mut flat = Vec::with_capacity(n * dims as usize);
        for _ in 0..n {
            flat.push(self.f64()?);
            flat.push(self.f64()?);
            match (has_z, has_m) {
                (true, false) => flat.push(self.f64()?),
                (true, true) => {
                    flat.push(self.f64()?);
                    flat.push(self.f64()?);
                }
                (false, true) => {
                    flat.push(f64::NAN);
                    flat.push(self.f64()?);
                }
                (false, false) => {}
            }
        }
        Ok(Coords { dims, flat })
    }

    /// One geometry including its header. Returns the SRID when present.
    fn geometry(&mut self) -> Result<(Shape, Option<i32>), String> {
        self.byte_order()?;
        let raw = self.u32()?;
        let srid = if raw & EWKB_SRID != 0 {
            Some(self.u32()? as i32)
        } else {
            None
        };
        let mut has_z = raw & EWKB_Z != 0;
        let mut has_m = raw & EWKB_M != 0;
        let mut code = raw & 0x0FFF_FFFF;
        match code / 1000 {
            0 => {}
            1 => has_z = true,
            2 => has_m = true,
            3 => {
                has_z = true;
                has_m = true;
            }
            _ => return Err(format!("ParseException: Unknown WKB type {raw}")),
        }
        code %= 1000;
        let ordinates = 2 + has_z as usize + has_m as usize;
        let shape = match code {
            1 => {
                let c = self.coords(1, has_z, has_m)?;
                if c.flat.iter().all(|v| v.is_nan()) {
                    Shape::Point(Coords::empty(c.dims))
                } else {
                    Shape::Point(c)
                }
            }
            2 => {
                let n = self.count(ordinates * 8)?;
                Shape::LineString(self.coords(n, has_z, has_m)?)
            }
            3 => {
                let rings = self.count(4)?;
                let mut out = Vec::with_capacity(rings);
                for _ in 0..rings {
                    let n = self.count(ordinates * 8)?;
                    out.push(self.coords(n, has_z, has_m)?);
                }
                Shape::Polygon(out)
            }
            4..=7 => {
                let n = self.count(5)?;
                let mut members = Vec::with_capacity(n);
                for _ in 0..n {
                    members.push(self.geometry()?.0);
                }
                match code {
                    4 => Shape::MultiPoint(members),
                    5 => Shape::MultiLineString(members),
                    6 => Shape::MultiPolygon(members),
                    _ => Shape::GeometryCollection(members),
                }
            }
            _ => return Err(format!("ParseException: Unknown WKB type {raw}")),
        };
        Ok((shape, srid))
    }
}

pub(crate) fn read(bytes: &[u8]) -> Result<(Shape, Option<i32>), String> {
    let mut reader = Reader {
        buf: bytes,
        little: true,
    };
    reader.geometry()
}

struct Writer {
    out: BytesMut,
    settings: WkbSettings,
    dims: u8,
    measured: bool,
}

impl Writer {
    fn u32(&mut self, value: u32) {
        match self.settings.byte_order {
            ByteOrder::LittleEndian => self.out.put_u32_le(value),
            ByteOrder::BigEndian => self.out.put_u32(value),
        }
    }

    fn f64(&mut self, value: f64) {
        match self.settings.byte_order {
            ByteOrder::LittleEndian => self.out.put_f64_le(value),
            ByteOrder::BigEndian => self.out.put_f64(value),
        }
    }

    fn header(&mut self, type_id: GeometryTypeId, srid: Option<i32>) {
        self.out.put_u8(match self.settings.byte_order {
            ByteOrder::BigEndian => 0,
            ByteOrder::LittleEndian => 1,
        });
        let has_z = self.dims >= 3 && !self.measured;
        let has_m = self.dims == 4;
        let base = wkb_code(type_id);
        let code = match self.settings.flavor {
            WkbFlavor::Iso => base + 1000 * (has_z as u32 + 2 * has_m as u32),
            WkbFlavor::Extended => {
                let mut code = base;
                if has_z {
                    code |= EWKB_Z;
                }
                if has_m {
                    code |= EWKB_M;
                }
                if srid.is_some() {
                    code |= EWKB_SRID;
                }
                code
            }
        };
        self.u32(code);
        if let Some(srid) = srid {
            self.u32(srid as u32);
        }
    }

    fn coord(&mut self, c: &[f64]) {
        let get = |i: usize| c.get(i).copied().unwrap_or(f64::NAN);
        self.f64(get(0));
        self.f64(get(1));
        match (self.dims, self.measured) {
            (3, _) => self.f64(get(2)),
            (4, true) => self.f64(get(3)),
            (4, false) => {
                self.f64(get(2));
                self.f64(get(3));
            }
            _ => {}
        }
    }

    fn coord_list(&mut self, coords: &Coords) {
        self.u32(coords.len() as u32);
        for i in 0..coords.len() {
            self.coord(coords.coord(i));
        }
    }

    fn geometry(&mut self, shape: &Shape, srid: Option<i32>) {
        self.header(shape.type_id(), srid);
        match shape {
            Shape::Point(c) if c.is_empty() => {
                self.coord(&[]);
            }
            Shape::Point(c) => self.coord(c.coord(0)),
            Shape::LineString(c) | Shape::LinearRing(c) => self.coord_list(c),
            Shape::Polygon(rings) => {
                self.u32(rings.len() as u32);
                for ring in rings {
                    self.coord_list(ring);
                }
            }
            Shape::MultiPoint(members)
            | Shape::MultiLineString(members)
            | Shape::MultiPolygon(members)
            | Shape::GeometryCollection(members) => {
                self.u32(members.len() as u32);
                for member in members {
                    self.geometry(member, None);
                }
            }
        }
    }
}

pub(crate) fn write(shape: &Shape, srid: i32, settings: WkbSettings) -> Vec<u8> {
    let dims = shape.dims().min(settings.output_dimension);
    let mut measured = dims == 4;
    shape.visit_coords(&mut |c| {
        if c.dims == 4 && c.flat.chunks_exact(4).any(|xyzm| !xyzm[2].is_nan()) {
            measured = false;
        }
    });
    let srid = (settings.include_srid && settings.flavor == WkbFlavor::Extended).then_some(srid);
    let mut writer = Writer {
        out: BytesMut::new(),
        settings,
        dims,
        measured,
    };
    writer.geometry(shape, srid);
    writer.out.to_vec()
}

impl Engine {
    pub(crate) fn wkb_read(&mut self, codec: CodecId, bytes: &[u8]) -> Option<GeomId> {
        if !matches!(self.codec(codec)?, CodecNode::WkbReader) {
            return self.fail("IllegalArgumentException: handle is not a WKB reader");
        }
        match read(bytes) {
            Ok((shape, srid)) => self.create_geom(&shape, srid.unwrap_or(0)),
            Err(message) => self.fail(message),
        }
    }

    pub(crate) fn wkb_write(&self, codec: CodecId, id: GeomId) -> Option<Vec<u8>> {
        let settings = match self.codec(codec)? {
            CodecNode::WkbWriter(settings) => *settings,
            _ => return self.fail("IllegalArgumentException: handle is not a WKB writer"),
        };
        let srid = self.srid(id)?;
        let shape = self.export(id)?;
        Some(write(&shape, srid, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NDR: WkbSettings = WkbSettings {
        flavor: WkbFlavor::Extended,
        byte_order: ByteOrder::LittleEndian,
        include_srid: false,
        output_dimension: 4,
    };

    #[test]
    fn test_point_layout() {
        let point = Shape::Point(Coords::from_xy([(1.0, 2.0)]));
        let bytes = write(&point, 0, NDR);
        assert_eq!(bytes.len(), 21);
        assert_eq!(&bytes[..5], &[1, 1, 0, 0, 0]);
        assert_eq!(read(&bytes).unwrap(), (point, None));
    }

    #[test]
    fn test_big_endian_with_srid() {
        let line = Shape::LineString(Coords::from_xy([(0.0, 0.0), (1.0, 1.0)]));
        let settings = WkbSettings {
            byte_order: ByteOrder::BigEndian,
            include_srid: true,
            ..NDR
        };
        let bytes = write(&line, 4326, settings);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &[0x20, 0, 0, 2]);
        assert_eq!(read(&bytes).unwrap(), (line, Some(4326)));
    }

    #[test]
    fn test_iso_dimensions() {
        let point = Shape::Point(Coords {
            dims: 3,
            flat: vec![1.0, 2.0, 3.0],
        });
        let iso = WkbSettings {
            flavor: WkbFlavor::Iso,
            ..NDR
        };
        let bytes = write(&point, 0, iso);
        assert_eq!(&bytes[1..5], &1001u32.to_le_bytes());
        assert_eq!(read(&bytes).unwrap().0, point);

        let flat = WkbSettings {
            output_dimension: 2,
            ..NDR
        };
        assert_eq!(write(&point, 0, flat).len(), 21);
    }

    #[test]
    fn test_collections_and_empties() {
        let shape = Shape::GeometryCollection(vec![
            Shape::Point(Coords::empty(2)),
            Shape::Polygon(vec![Coords::from_xy([
                (0.0, 0.0),
                (1.0, 0.0),
                (1.0, 1.0),
                (0.0, 0.0),
            ])]),
        ]);
        let bytes = write(&shape, 0, NDR);
        assert_eq!(read(&bytes).unwrap().0, shape);
    }

    #[test]
    fn test_truncated_input() {
        let bytes = write(&Shape::Point(Coords::from_xy([(1.0, 2.0)])), 0, NDR);
        assert_eq!(read(&bytes[..10]).unwrap_err(), UNEXPECTED_EOF);
        assert!(read(&[]).is_err());
        assert!(read(&[7]).unwrap_err().contains("byte order"));
        assert!(read(&[1, 99, 0, 0, 0]).unwrap_err().contains("Unknown WKB type"));
    }
}
