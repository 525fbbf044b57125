use std::{fs::File, io::{BufReader, Cursor, Read, Seek}, path::{Path, PathBuf}};

use anyhow::{anyhow, bail, ensure, Context, Result};
use tiff::{
    decoder::{ifd::Value, Decoder, DecodingResult},
    encoder::{colortype::Gray32Float, TiffEncoder},
    tags::Tag,
};

use crate::common;
use super::{grid::Raster, transform::GeoTransform};

const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const MODEL_TRANSFORMATION: Tag = Tag::ModelTransformationTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

const RASTER_TYPE_KEY: u32 = 1025;
const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;

const PIXEL_IS_POINT: u32 = 2;

/// Read one band (1-based) of a GeoTIFF as f64, with the nodata value mapped to NaN.
pub fn read_geotiff(path: &Path, band: usize) -> Result<Raster> {
    common::require_file_exists(path)?;
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoTIFF: {}", path.display()))?;
    decode_geotiff(BufReader::new(file), band)
        .with_context(|| format!("[raster] reading band {band} of {}", path.display()))
}

fn decode_geotiff<R: Read + Seek>(reader: R, band: usize) -> Result<Raster> {
    ensure!(band >= 1, "band numbers start at 1");

    let mut decoder = Decoder::new(reader).context("TIFF decode error")?;
    let (width, height) = decoder.dimensions().context("cannot read dimensions")?;
    let (rows, cols) = (height as usize, width as usize);

    let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1);
    ensure!(band <= samples, "band {band} requested but the image has {samples}");
    ensure!(samples == 1 || planar == 1, "planar multi-band images are not supported"); // 1 = chunky

    let values: Vec<f64> = match decoder.read_image().context("cannot read image data")? {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => bail!("unsupported TIFF pixel format"),
    };
    ensure!(values.len() == rows * cols * samples,
        "decoded {} samples for a {cols}x{rows} image with {samples} bands", values.len());

    let nodata = read_nodata(&mut decoder);
    let band_values = values.into_iter()
        .skip(band - 1)
        .step_by(samples)
        .map(|v| match nodata {
            Some(nd) if v == nd => f64::NAN,
            _ => v,
        })
        .collect();

    let geokeys = read_geokeys(&mut decoder);
    let mut transform = read_geotransform(&mut decoder)?;
    if geokey(&geokeys, RASTER_TYPE_KEY) == Some(PIXEL_IS_POINT) {
        // tiepoints refer to pixel centers; move the origin to the upper-left corner
        transform.origin_x -= 0.5 * (transform.pixel_width + transform.row_rotation);
        transform.origin_y -= 0.5 * (transform.col_rotation + transform.pixel_height);
    }
    let epsg = [PROJECTED_CS_TYPE_KEY, GEOGRAPHIC_TYPE_KEY].into_iter()
        .find_map(|id| geokey(&geokeys, id))
        .filter(|&code| code != 0 && code != 32767); // user-defined

    Raster::from_vec(band_values, rows, cols, transform, epsg)
}

/// GeoTIFF placement from ModelPixelScale + ModelTiepoint, or ModelTransformation.
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let (Ok(scale), Ok(tiepoint)) = (decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE), decoder.get_tag_f64_vec(MODEL_TIEPOINT)) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    if let Ok(m) = decoder.get_tag_f64_vec(MODEL_TRANSFORMATION) {
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    Err(anyhow!("no georeferencing tags (ModelPixelScale/ModelTiepoint or ModelTransformation)"))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    match decoder.find_tag(GDAL_NODATA) {
        Ok(Some(Value::Ascii(s))) => s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok(),
        _ => None,
    }
}

/// Raw GeoKeyDirectory, empty when absent.
fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Vec<u32> {
    decoder.get_tag_u32_vec(GEO_KEY_DIRECTORY).unwrap_or_default()
}

/// Inline value of one geokey.
fn geokey(keys: &[u32], id: u32) -> Option<u32> {
    // header [version, revision, minor, count] then [key, location, count, value] entries
    keys.get(4..)?.chunks_exact(4)
        .find(|entry| entry[0] == id && entry[1] == 0)
        .map(|entry| entry[3])
}

/// Write a raster as a single-band 32-bit float GeoTIFF (NaN stays NaN).
pub fn write_geotiff(raster: &Raster, path: &Path, force: bool) -> Result<PathBuf> {
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))
        .with_context(|| format!("[raster] encoding {}", path.display()))?;
    common::write_bytes_atomic(path, &buf, force)
}

fn encode_geotiff<W: std::io::Write + Seek>(raster: &Raster, writer: W) -> Result<()> {
    let gt = raster.transform();
    ensure!(gt.row_rotation == 0.0 && gt.col_rotation == 0.0, "rotated rasters cannot be written");

    let mut encoder = TiffEncoder::new(writer).context("TIFF encoder error")?;
    let mut image = encoder.new_image::<Gray32Float>(raster.cols() as u32, raster.rows() as u32)
        .context("cannot create TIFF image")?;

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image.encoder().write_tag(MODEL_PIXEL_SCALE, &scale[..]).context("cannot write scale tag")?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image.encoder().write_tag(MODEL_TIEPOINT, &tiepoint[..]).context("cannot write tiepoint tag")?;

    // GTModelTypeGeoKey (1 projected / 2 geographic), GTRasterTypeGeoKey = PixelIsArea, then the CRS key
    let mut geokeys: Vec<u16> = vec![1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    if let Some(epsg) = raster.epsg().and_then(|e| u16::try_from(e).ok()) {
        let geographic = matches!(epsg, 4326 | 4269 | 4267);
        geokeys[3] = 3;
        geokeys[7] = if geographic { 2 } else { 1 };
        let key = (if geographic { GEOGRAPHIC_TYPE_KEY } else { PROJECTED_CS_TYPE_KEY }) as u16;
        geokeys.extend([key, 0, 1, epsg]);
    }
    image.encoder().write_tag(GEO_KEY_DIRECTORY, &geokeys[..]).context("cannot write geokey tag")?;

    let data: Vec<f32> = raster.data().iter().map(|&v| v as f32).collect();
    image.write_data(&data).context("cannot write image data")?;
    Ok(())
}
