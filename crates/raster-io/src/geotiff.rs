//! Single-band GeoTIFF reading and writing.
//!
//! Only the subset of GeoTIFF needed by the pipeline is handled: north-up
//! rasters georeferenced through ModelPixelScale + ModelTiepoint (or a
//! ModelTransformation without rotation), an EPSG code in the GeoKey
//! directory and the GDAL_NODATA ASCII tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use erosivity_common::{ErosivityError, GeoTransform, Nodata, RasterGrid, Result};

use crate::persist_atomically;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn tiff_error(path: &Path) -> impl Fn(tiff::TiffError) -> ErosivityError + '_ {
    move |e| ErosivityError::raster_format(format!("{}: {}", path.display(), e))
}

/// Read a single-band GeoTIFF.
///
/// The returned grid keeps the file's own nodata marker; a missing
/// GDAL_NODATA tag means NaN marks missing cells.
pub fn read_geotiff(path: &Path) -> Result<RasterGrid> {
    let file = File::open(path).map_err(|e| {
        ErosivityError::Io(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_error(path))?;

    match decoder.colortype().map_err(tiff_error(path))? {
        ColorType::Gray(_) => {}
        other => {
            return Err(ErosivityError::raster_format(format!(
                "{}: expected a single-band raster, found {:?}",
                path.display(),
                other
            )))
        }
    }

    let (width, height) = decoder.dimensions().map_err(tiff_error(path))?;
    let geotransform = read_geotransform(&mut decoder, path)?;
    let projection = read_projection(&mut decoder, path)?;
    let nodata = match decoder.find_tag(tag(GDAL_NODATA)).map_err(tiff_error(path))? {
        Some(value) => {
            let text = value.into_string().map_err(tiff_error(path))?;
            text.parse::<Nodata>().map_err(|e| {
                ErosivityError::raster_format(format!("{}: {}", path.display(), e))
            })?
        }
        None => Nodata::Nan,
    };

    let data = match decoder.read_image().map_err(tiff_error(path))? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => {
            return Err(ErosivityError::raster_format(format!(
                "{}: unsupported sample format",
                path.display()
            )))
        }
    };

    debug!(
        path = %path.display(),
        cols = width,
        rows = height,
        projection = %projection,
        nodata = %nodata,
        "Read GeoTIFF"
    );

    RasterGrid::new(
        data,
        height as usize,
        width as usize,
        geotransform,
        projection,
        nodata,
    )
}

fn find_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
    path: &Path,
) -> Result<Option<Vec<f64>>> {
    decoder
        .find_tag(tag(code))
        .map_err(tiff_error(path))?
        .map(|v| v.into_f64_vec().map_err(tiff_error(path)))
        .transpose()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<GeoTransform> {
    let scale = find_f64s(decoder, MODEL_PIXEL_SCALE, path)?;
    let tiepoint = find_f64s(decoder, MODEL_TIEPOINT, path)?;

    if let (Some(scale), Some(tie)) = (scale, tiepoint) {
        if scale.len() < 2 || tie.len() < 6 {
            return Err(ErosivityError::raster_format(format!(
                "{}: truncated ModelPixelScale/ModelTiepoint tags",
                path.display()
            )));
        }
        let (sx, sy) = (scale[0], scale[1]);
        let origin_x = tie[3] - tie[0] * sx;
        let origin_y = tie[4] + tie[1] * sy;
        return GeoTransform::north_up(origin_x, origin_y, sx, sy);
    }

    if let Some(m) = find_f64s(decoder, MODEL_TRANSFORMATION, path)? {
        if m.len() < 8 {
            return Err(ErosivityError::raster_format(format!(
                "{}: truncated ModelTransformation tag",
                path.display()
            )));
        }
        return GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]);
    }

    Err(ErosivityError::raster_format(format!(
        "{}: raster has no georeferencing tags",
        path.display()
    )))
}

fn read_projection<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<String> {
    let keys = match decoder
        .find_tag(tag(GEO_KEY_DIRECTORY))
        .map_err(tiff_error(path))?
    {
        Some(value) => value.into_u16_vec().map_err(tiff_error(path))?,
        None => return Ok(String::new()),
    };

    // Header is [version, revision, minor, key count]; entries are
    // [key id, location, count, value] with location 0 meaning inline.
    let code_for = |wanted: u16| {
        keys.get(4..)
            .unwrap_or(&[])
            .chunks_exact(4)
            .find(|entry| entry[0] == wanted && entry[1] == 0)
            .map(|entry| entry[3])
    };

    let code = code_for(PROJECTED_CS_TYPE_KEY).or_else(|| code_for(GEOGRAPHIC_TYPE_KEY));
    Ok(match code {
        Some(c) if c != USER_DEFINED => format!("EPSG:{}", c),
        _ => String::new(),
    })
}

fn geo_keys(projection: &str) -> Result<Vec<u16>> {
    let mut entries: Vec<[u16; 4]> = Vec::new();

    if !projection.is_empty() {
        let code: u16 = projection
            .split_once(':')
            .filter(|(auth, _)| auth.eq_ignore_ascii_case("EPSG"))
            .and_then(|(_, code)| code.trim().parse().ok())
            .ok_or_else(|| {
                ErosivityError::raster_format(format!(
                    "projection '{}' is not an EPSG:<code> identifier",
                    projection
                ))
            })?;

        if (4000..5000).contains(&code) {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
            entries.push([GEOGRAPHIC_TYPE_KEY, 0, 1, code]);
        } else {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, MODEL_TYPE_PROJECTED]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
            entries.push([PROJECTED_CS_TYPE_KEY, 0, 1, code]);
        }
    } else {
        entries.push([GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    Ok(keys)
}

/// Write `grid` as a Float32 GeoTIFF, replacing any existing file.
///
/// The nodata marker is always written, so downstream readers never have to
/// guess it.
pub fn write_geotiff(path: &Path, grid: &RasterGrid) -> Result<()> {
    let keys = geo_keys(grid.projection())?;
    let gt = grid.geotransform();
    let scale = [gt.pixel_width(), gt.cell_height(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x(), gt.origin_y(), 0.0];
    let nodata = grid.nodata().to_string();

    persist_atomically(path, |file| {
        let mut writer = BufWriter::new(file);
        {
            let mut encoder = TiffEncoder::new(&mut writer).map_err(tiff_error(path))?;
            let mut image = encoder
                .new_image::<colortype::Gray32Float>(grid.cols() as u32, grid.rows() as u32)
                .map_err(tiff_error(path))?;

            let dir = image.encoder();
            dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
                .map_err(tiff_error(path))?;
            dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
                .map_err(tiff_error(path))?;
            dir.write_tag(tag(GEO_KEY_DIRECTORY), &keys[..])
                .map_err(tiff_error(path))?;
            dir.write_tag(tag(GDAL_NODATA), nodata.as_str())
                .map_err(tiff_error(path))?;

            image.write_data(grid.data()).map_err(tiff_error(path))?;
        }
        writer.flush()?;
        Ok(())
    })?;

    debug!(
        path = %path.display(),
        cols = grid.cols(),
        rows = grid.rows(),
        "Wrote GeoTIFF"
    );
    Ok(())
}
