//! Legacy ESRI ASCII grid reader.
//!
//! Six `key value` header lines (`ncols`, `nrows`, `xllcorner`/`xllcenter`,
//! `yllcorner`/`yllcenter`, `cellsize`, `nodata_value`) followed by the cell
//! values row by row, top row first. Tabs and spaces are both accepted.

use std::fs;
use std::path::Path;

use erosivity_common::{ErosivityError, GeoTransform, Nodata, RasterGrid, Result};

/// Parsed ASCII grid header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsciiHeader {
    pub ncols: usize,
    pub nrows: usize,
    /// Lower-left corner, converted from `*llcenter` if needed.
    pub xllcorner: f64,
    pub yllcorner: f64,
    pub cellsize: f64,
    pub nodata: Nodata,
}

impl AsciiHeader {
    pub fn geotransform(&self) -> Result<GeoTransform> {
        GeoTransform::from_ascii_header(
            self.ncols,
            self.nrows,
            self.xllcorner,
            self.yllcorner,
            self.cellsize,
        )
    }
}

const HEADER_LINES: usize = 6;

fn header_error(source: &str, msg: impl std::fmt::Display) -> ErosivityError {
    ErosivityError::raster_format(format!("{}: {}", source, msg))
}

/// Parse the six header lines.
pub fn parse_header(lines: &[&str], source: &str) -> Result<AsciiHeader> {
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut x_center = false;
    let mut y_center = false;
    let mut cellsize = None;
    let mut nodata = None;

    for line in lines {
        let mut parts = line.split_whitespace();
        let (key, value) = match (parts.next(), parts.next()) {
            (Some(k), Some(v)) => (k.to_ascii_lowercase(), v),
            _ => return Err(header_error(source, format!("malformed header line '{}'", line))),
        };
        let number = |v: &str| -> Result<f64> {
            v.parse::<f64>()
                .map_err(|_| header_error(source, format!("invalid {} value '{}'", key, v)))
        };
        let count = |v: &str| -> Result<usize> {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(header_error(
                    source,
                    format!("{} must be a positive integer, got '{}'", key, v),
                )),
            }
        };

        match key.as_str() {
            "ncols" => ncols = Some(count(value)?),
            "nrows" => nrows = Some(count(value)?),
            "xllcorner" => xll = Some(number(value)?),
            "xllcenter" => {
                xll = Some(number(value)?);
                x_center = true;
            }
            "yllcorner" => yll = Some(number(value)?),
            "yllcenter" => {
                yll = Some(number(value)?);
                y_center = true;
            }
            "cellsize" => cellsize = Some(number(value)?),
            "nodata_value" => {
                nodata = Some(
                    value
                        .parse::<Nodata>()
                        .map_err(|e| header_error(source, e))?,
                )
            }
            other => return Err(header_error(source, format!("unknown header key '{}'", other))),
        }
    }

    let missing = |name: &str| header_error(source, format!("header is missing '{}'", name));
    let cellsize = cellsize.ok_or_else(|| missing("cellsize"))?;
    let mut xllcorner = xll.ok_or_else(|| missing("xllcorner"))?;
    let mut yllcorner = yll.ok_or_else(|| missing("yllcorner"))?;
    if x_center {
        xllcorner -= cellsize / 2.0;
    }
    if y_center {
        yllcorner -= cellsize / 2.0;
    }

    Ok(AsciiHeader {
        ncols: ncols.ok_or_else(|| missing("ncols"))?,
        nrows: nrows.ok_or_else(|| missing("nrows"))?,
        xllcorner,
        yllcorner,
        cellsize,
        nodata: nodata.ok_or_else(|| missing("nodata_value"))?,
    })
}

/// Parse a whole ASCII grid held in memory.
///
/// ASCII grids carry no projection, so the caller supplies it.
pub fn parse_ascii_grid(text: &str, projection: &str, source: &str) -> Result<RasterGrid> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < HEADER_LINES {
        return Err(header_error(
            source,
            format!("expected {} header lines, found {}", HEADER_LINES, lines.len()),
        ));
    }

    let header = parse_header(&lines[..HEADER_LINES], source)?;
    let expected = header.ncols.checked_mul(header.nrows).ok_or_else(|| {
        header_error(
            source,
            format!("{}x{} cells overflow the addressable size", header.ncols, header.nrows),
        )
    })?;

    let mut data = Vec::new();
    for (line_no, line) in lines[HEADER_LINES..].iter().enumerate() {
        for token in line.split_whitespace() {
            if data.len() == expected {
                return Err(header_error(
                    source,
                    format!(
                        "more than the {}x{} declared cells on data line {}",
                        header.ncols,
                        header.nrows,
                        line_no + 1
                    ),
                ));
            }
            let value: f32 = token.parse().map_err(|_| {
                header_error(
                    source,
                    format!("invalid value '{}' on data line {}", token, line_no + 1),
                )
            })?;
            data.push(value);
        }
    }

    if data.len() != expected {
        return Err(header_error(
            source,
            format!(
                "header declares {}x{} cells but {} values were found",
                header.ncols,
                header.nrows,
                data.len()
            ),
        ));
    }

    RasterGrid::new(
        data,
        header.nrows,
        header.ncols,
        header.geotransform()?,
        projection,
        header.nodata,
    )
}

/// Read an ASCII grid file.
pub fn read_ascii_grid(path: &Path, projection: &str) -> Result<RasterGrid> {
    let text = fs::read_to_string(path)
        .map_err(|e| ErosivityError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    parse_ascii_grid(&text, projection, &path.display().to_string())
}
