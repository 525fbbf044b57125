use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

#[derive(Debug, Clone)]
pub(crate) struct BoundingBox {
    idx: usize, // Index of corresponding MultiPolygon in shapes
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Polygon store for a layer, indexed by unit position, with a bounding-box R-tree.
#[derive(Debug, Clone)]
pub struct Geometries {
    shapes: Vec<MultiPolygon<f64>>,
    rtree: RTree<BoundingBox>,
    epsg: u32, // 0 when projected / unknown (coordinates taken as meters)
}

impl Geometries {
    /// Construct a Geometries object from a vector of MultiPolygons.
    /// Empty shapes are kept (so indices line up) but are not indexed.
    pub fn new(shapes: Vec<MultiPolygon<f64>>, epsg: u32) -> Self {
        Self {
            rtree: RTree::bulk_load(shapes.iter().enumerate()
                .filter_map(|(idx, shape)| shape.bounding_rect().map(|bbox| BoundingBox { idx, bbox }))
                .collect()),
            shapes,
            epsg,
        }
    }

    #[inline] pub fn len(&self) -> usize { self.shapes.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.shapes.is_empty() }

    #[inline] pub fn shapes(&self) -> &[MultiPolygon<f64>] { &self.shapes }

    #[inline] pub fn epsg(&self) -> u32 { self.epsg }

    /// Whether coordinates are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4269 | 4267 | 4937)
    }

    /// Bounding rectangle of all shapes, if any shape is non-empty.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        if self.rtree.size() == 0 { return None }
        let envelope = self.rtree.root().envelope();
        Some(Rect::new(envelope.lower(), envelope.upper()))
    }

    /// Indices of shapes whose bounding box intersects `[min_x, min_y, max_x, max_y]`, sorted.
    pub fn query_indices(&self, bounds: [f64; 4]) -> Vec<usize> {
        let [min_x, min_y, max_x, max_y] = bounds;
        let envelope = AABB::from_corners([min_x, min_y], [max_x, max_y]);
        let mut indices: Vec<usize> = self.rtree
            .locate_in_envelope_intersecting(&envelope)
            .map(|bbox| bbox.idx)
            .collect();
        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use geo::{polygon, MultiPolygon};

    use super::Geometries;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y), (x: x + size, y: y), (x: x + size, y: y + size), (x: x, y: y + size), (x: x, y: y),
        ]])
    }

    #[test]
    fn bounds_and_queries() {
        let geoms = Geometries::new(vec![square(0.0, 0.0, 1.0), MultiPolygon(vec![]), square(5.0, 5.0, 2.0)], 0);
        assert_eq!(geoms.len(), 3);
        assert!(!geoms.is_geographic());

        let b = geoms.bounds().unwrap();
        assert_eq!((b.min().x, b.min().y, b.max().x, b.max().y), (0.0, 0.0, 7.0, 7.0));

        assert_eq!(geoms.query_indices([-1.0, -1.0, 0.5, 0.5]), vec![0]);
        assert_eq!(geoms.query_indices([0.0, 0.0, 10.0, 10.0]), vec![0, 2]);
        assert!(geoms.query_indices([20.0, 20.0, 30.0, 30.0]).is_empty());
    }

    #[test]
    fn empty_has_no_bounds() {
        let geoms = Geometries::new(vec![MultiPolygon(vec![])], 4269);
        assert!(geoms.bounds().is_none());
        assert!(geoms.is_geographic());
    }
}
