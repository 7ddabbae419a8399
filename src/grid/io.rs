//! The two-file grid format: an ASCII `.hdr` describing the geometry and
//! a raw `.buf` holding the elements, z index varying fastest.

use super::kind::{ElemKind, GridKind};
use super::{Grid3, GridHdr, Source};
use crate::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

/// Byte-order policy of a grid handle.
///
/// Swapping on read happens per element after loading; swapping on write
/// happens up-front, before the bytes leave the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapMode {
    #[default]
    Native,
    SwapIn,
    SwapOut,
    SwapBoth,
}

impl SwapMode {
    fn on_read(&self) -> bool {
        matches!(self, SwapMode::SwapIn | SwapMode::SwapBoth)
    }

    fn on_write(&self) -> bool {
        matches!(self, SwapMode::SwapOut | SwapMode::SwapBoth)
    }
}

fn header_error(file: &str, details: impl Into<String>) -> Error {
    Error::Header {
        file: file.to_string(),
        details: details.into(),
    }
}

impl Grid3 {
    /// Write `<root>.hdr` and `<root>.buf`.
    ///
    /// The buffer is written in one pass; for cascading grids it is the
    /// per-level plane sequence. Byte order follows the grid's swap mode.
    pub fn write(&self, root: &str) -> Result<(), Error> {
        self.write_hdr(root)?;
        self.write_buf(root)
    }

    fn write_hdr(&self, root: &str) -> Result<(), Error> {
        let hdr = &self.hdr;
        let file = File::create(format!("{root}.hdr"))?;
        let mut w = BufWriter::new(file);

        writeln!(
            w,
            "{} {} {}  {:.6} {:.6} {:.6}  {:.6} {:.6} {:.6} {} {}",
            hdr.nx,
            hdr.ny,
            hdr.nz,
            hdr.origx,
            hdr.origy,
            hdr.origz,
            hdr.dx,
            hdr.dy,
            hdr.dz,
            hdr.kind.tag(),
            hdr.elem.tag()
        )?;

        if hdr.kind.has_source() {
            if let Some(source) = &hdr.source {
                writeln!(
                    w,
                    "{} {:.6} {:.6} {:.6}",
                    source.label, source.x, source.y, source.z
                )?;
            }
        }

        writeln!(
            w,
            "TRANSFORM  {}",
            hdr.transform.as_deref().unwrap_or("NONE")
        )?;

        if hdr.is_cascading() {
            write!(w, "CASCADING_GRID {} ", hdr.merge_depths.len())?;
            for depth in &hdr.merge_depths {
                write!(w, "{depth},")?;
            }
            writeln!(w)?;
        }

        w.flush()?;
        Ok(())
    }

    fn write_buf(&self, root: &str) -> Result<(), Error> {
        let file = File::create(format!("{root}.buf"))?;
        let mut w = BufWriter::new(file);
        let swap = self.hdr.swap.on_write();

        match self.hdr.elem {
            ElemKind::Float => {
                for v in self.buf() {
                    let mut bits = v.to_bits();
                    if swap {
                        bits = bits.swap_bytes();
                    }
                    w.write_all(&bits.to_ne_bytes())?;
                }
            }
            ElemKind::Double => {
                for v in self.buf() {
                    let mut bits = (*v as f64).to_bits();
                    if swap {
                        bits = bits.swap_bytes();
                    }
                    w.write_all(&bits.to_ne_bytes())?;
                }
            }
        }

        w.flush()?;
        Ok(())
    }

    /// Read `<root>.hdr` and `<root>.buf` into an allocated grid
    pub fn read(root: &str) -> Result<Grid3, Error> {
        Grid3::read_with(root, SwapMode::Native)
    }

    /// Like [`read`](Self::read), with an explicit byte-order policy
    pub fn read_with(root: &str, swap: SwapMode) -> Result<Grid3, Error> {
        let mut hdr = read_hdr(&format!("{root}.hdr"))?;
        hdr.swap = swap;
        hdr.title = root.to_string();

        let mut grid = Grid3::allocate(hdr)?;
        read_buf(&format!("{root}.buf"), &mut grid)?;
        Ok(grid)
    }
}

fn read_hdr(path: &str) -> Result<GridHdr, Error> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first = lines
        .next()
        .ok_or_else(|| header_error(path, "empty header"))??;
    let tokens: Vec<&str> = first.split_whitespace().collect();
    if tokens.len() < 10 {
        return Err(header_error(
            path,
            format!("expected at least 10 header fields, found {}", tokens.len()),
        ));
    }

    let mut numbers = [0.0_f64; 9];
    for (n, slot) in numbers.iter_mut().enumerate() {
        *slot = tokens[n]
            .parse()
            .map_err(|_| header_error(path, format!("malformed header token '{}'", tokens[n])))?;
    }

    let kind = GridKind::from_tag(tokens[9])
        .map_err(|_| header_error(path, format!("unrecognized grid type '{}'", tokens[9])))?;
    // Old writers omit the element tag; float is their only element type
    let elem = match tokens.get(10) {
        Some(tag) => ElemKind::from_tag(tag)
            .map_err(|_| header_error(path, format!("unrecognized element type '{tag}'")))?,
        None => ElemKind::Float,
    };

    let mut hdr = GridHdr {
        nx: numbers[0] as usize,
        ny: numbers[1] as usize,
        nz: numbers[2] as usize,
        origx: numbers[3],
        origy: numbers[4],
        origz: numbers[5],
        dx: numbers[6],
        dy: numbers[7],
        dz: numbers[8],
        kind,
        elem,
        ..Default::default()
    };

    for line in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("TRANSFORM") {
            hdr.transform = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("CASCADING_GRID") {
            hdr.merge_depths = parse_cascading(path, rest)?;
        } else if hdr.kind.has_source() && hdr.source.is_none() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(header_error(path, format!("malformed source line '{line}'")));
            }
            let mut coords = [0.0_f64; 3];
            for (n, slot) in coords.iter_mut().enumerate() {
                *slot = fields[n + 1].parse().map_err(|_| {
                    header_error(path, format!("malformed source token '{}'", fields[n + 1]))
                })?;
            }
            hdr.source = Some(Source::new(fields[0], coords[0], coords[1], coords[2]));
        }
    }

    Ok(hdr)
}

fn parse_cascading(path: &str, rest: &str) -> Result<Vec<f64>, Error> {
    let mut fields = rest.split_whitespace();
    let count: usize = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| header_error(path, "malformed CASCADING_GRID count"))?;
    let list = fields
        .next()
        .ok_or_else(|| header_error(path, "missing CASCADING_GRID depths"))?;

    let mut depths = Vec::with_capacity(count);
    for token in list.split(',').filter(|t| !t.is_empty()) {
        let depth: f64 = token
            .parse()
            .map_err(|_| header_error(path, format!("malformed merge depth '{token}'")))?;
        depths.push(depth);
    }
    if depths.len() != count {
        return Err(header_error(
            path,
            format!("expected {count} merge depths, found {}", depths.len()),
        ));
    }
    Ok(depths)
}

fn read_buf(path: &str, grid: &mut Grid3) -> Result<(), Error> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let swap = grid.hdr.swap.on_read();
    let elem = grid.hdr.elem;

    match elem {
        ElemKind::Float => {
            let mut bytes = [0_u8; 4];
            for v in grid.buf_mut() {
                reader.read_exact(&mut bytes)?;
                let mut bits = u32::from_ne_bytes(bytes);
                if swap {
                    bits = bits.swap_bytes();
                }
                *v = f32::from_bits(bits);
            }
        }
        ElemKind::Double => {
            let mut bytes = [0_u8; 8];
            for v in grid.buf_mut() {
                reader.read_exact(&mut bytes)?;
                let mut bits = u64::from_ne_bytes(bytes);
                if swap {
                    bits = bits.swap_bytes();
                }
                *v = f64::from_bits(bits) as f32;
            }
        }
    }

    Ok(())
}

// ----- T E S T S ------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::kind::GridKind;

    fn tmp_root(name: &str) -> String {
        let dir = std::env::temp_dir().join("hypogrid-io-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name).to_str().unwrap().to_string()
    }

    #[test]
    fn write_read_roundtrip() -> Result<(), Error> {
        let mut hdr = GridHdr::new(3, 4, 5, 1., 2., 3., 0.5, 0.5, 0.5, GridKind::Time);
        hdr.source = Some(Source::new("EV01", 1.5, 2.5, 3.5));
        let mut grid = Grid3::allocate(hdr)?;
        for (n, v) in grid.buf_mut().iter_mut().enumerate() {
            *v = n as f32 / 7.0;
        }

        let root = tmp_root("roundtrip.time");
        grid.write(&root)?;
        let back = Grid3::read(&root)?;

        assert!(grid.identical_geometry(&back));
        assert_eq!(back.hdr.kind, GridKind::Time);
        assert_eq!(back.hdr.source, grid.hdr.source);
        assert_eq!(back.hdr.transform.as_deref(), Some("NONE"));
        for (a, b) in grid.buf().iter().zip(back.buf()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        Ok(())
    }

    #[test]
    fn swapped_write_read_roundtrip() -> Result<(), Error> {
        let hdr = GridHdr::new(2, 2, 2, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        let mut grid = Grid3::allocate(hdr)?;
        grid.init(5.5);
        grid.hdr.swap = SwapMode::SwapOut;

        let root = tmp_root("swapped.vel");
        grid.write(&root)?;

        // Reading the byte-swapped file natively yields garbage ...
        let native = Grid3::read(&root)?;
        assert_ne!(native.value_at(0, 0, 0), 5.5);

        // ... and swapping on read restores the values
        let swapped = Grid3::read_with(&root, SwapMode::SwapIn)?;
        assert_eq!(swapped.value_at(0, 0, 0), 5.5);
        Ok(())
    }

    #[test]
    fn double_elements() -> Result<(), Error> {
        let mut hdr = GridHdr::new(2, 2, 2, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        hdr.elem = ElemKind::Double;
        let mut grid = Grid3::allocate(hdr)?;
        grid.init(2.25);

        let root = tmp_root("double.vel");
        grid.write(&root)?;

        // The buffer on disk really is 8 bytes per element
        let meta = std::fs::metadata(format!("{root}.buf")).unwrap();
        assert_eq!(meta.len(), 8 * 8);

        let back = Grid3::read(&root)?;
        assert_eq!(back.value_at(1, 1, 1), 2.25);
        Ok(())
    }

    #[test]
    fn cascading_header_roundtrip() -> Result<(), Error> {
        let mut hdr = GridHdr::new(8, 8, 12, 0., 0., 0., 1., 1., 1., GridKind::Velocity);
        hdr.merge_depths = vec![4.0, 8.0];
        let mut grid = Grid3::allocate(hdr)?;
        grid.init(3.0);
        let cells = grid.num_cells();

        let root = tmp_root("casc.vel");
        grid.write(&root)?;

        let back = Grid3::read(&root)?;
        assert_eq!(back.hdr.merge_depths, vec![4.0, 8.0]);
        assert_eq!(back.num_cells(), cells);
        assert_eq!(back.value_at(7, 7, 11), 3.0);

        // The buffer is the cascading plane sequence, not the full cube
        let meta = std::fs::metadata(format!("{root}.buf")).unwrap();
        assert_eq!(meta.len() as usize, 4 * cells);
        Ok(())
    }

    #[test]
    fn corrupted_headers_are_rejected() {
        let root = tmp_root("corrupt");
        std::fs::write(format!("{root}.hdr"), "3 4 five  0 0 0  1 1 1 VELOCITY\n").unwrap();
        assert!(matches!(
            Grid3::read(&root),
            Err(Error::Header { .. })
        ));

        std::fs::write(format!("{root}.hdr"), "3 4 5  0 0 0  1 1 1 NOT_A_KIND\n").unwrap();
        assert!(matches!(
            Grid3::read(&root),
            Err(Error::Header { .. })
        ));

        std::fs::write(format!("{root}.hdr"), "3 4 5\n").unwrap();
        assert!(matches!(
            Grid3::read(&root),
            Err(Error::Header { .. })
        ));
    }

    #[test]
    fn short_buffer_is_an_io_error() {
        let root = tmp_root("short.vel");
        std::fs::write(
            format!("{root}.hdr"),
            "2 2 2  0 0 0  1 1 1 VELOCITY FLOAT\n",
        )
        .unwrap();
        // Only 4 of the 8 required elements
        std::fs::write(format!("{root}.buf"), [0_u8; 16]).unwrap();
        assert!(matches!(Grid3::read(&root), Err(Error::Io(_))));
    }
}
