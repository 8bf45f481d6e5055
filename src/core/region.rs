use crate::geometry::Region;
use crate::io::BoundarySource;
use crate::types::{CarbonError, CarbonResult, GeoPoint};
use geo::Area;

/// Picks the boundary polygon that contains a point
pub struct RegionResolver<'a> {
    source: &'a dyn BoundarySource,
}

impl<'a> RegionResolver<'a> {
    pub fn new(source: &'a dyn BoundarySource) -> Self {
        Self { source }
    }

    /// Region containing `point`.
    ///
    /// When several polygons contain the point the smallest one wins.
    pub fn containing(&self, point: GeoPoint) -> CarbonResult<Region> {
        let candidates = self.source.candidates(point)?;
        log::debug!("{} boundary candidate(s) for {}", candidates.len(), point);
        resolve(candidates, point)
    }
}

/// Exact containment over already-retrieved candidates
pub fn resolve(candidates: Vec<Region>, point: GeoPoint) -> CarbonResult<Region> {
    let region = candidates
        .into_iter()
        .filter(|r| r.contains(point))
        .min_by(|a, b| {
            let (a, b) = (a.polygon.as_geo(), b.polygon.as_geo());
            a.unsigned_area().total_cmp(&b.unsigned_area())
        })
        .ok_or(CarbonError::NoRegionFound {
            lon: point.lon,
            lat: point.lat,
        })?;
    log::info!("Resolved {} to region '{}'", point, region.name);
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::io::MemoryCatalog;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new()
            .with_boundary(Region::new("country", Polygon::rectangle(0.0, 0.0, 10.0, 10.0)))
            .with_boundary(Region::new("province", Polygon::rectangle(2.0, 2.0, 5.0, 5.0)))
            // bounding box covers (8, 8) but the triangle does not
            .with_boundary(Region::new(
                "triangle",
                Polygon::new(vec![
                    GeoPoint::new(6.0, 6.0),
                    GeoPoint::new(9.0, 6.0),
                    GeoPoint::new(6.0, 9.0),
                ]),
            ))
    }

    #[test]
    fn smallest_containing_region_wins() {
        let catalog = catalog();
        let resolver = RegionResolver::new(&catalog);
        let region = resolver.containing(GeoPoint::new(3.0, 3.0)).unwrap();
        assert_eq!(region.name, "province");
    }

    #[test]
    fn bounding_box_candidates_need_exact_containment() {
        let catalog = catalog();
        let resolver = RegionResolver::new(&catalog);
        let region = resolver.containing(GeoPoint::new(8.5, 8.5)).unwrap();
        assert_eq!(region.name, "country");
    }

    #[test]
    fn point_outside_everything_fails() {
        let catalog = catalog();
        let resolver = RegionResolver::new(&catalog);
        let err = resolver.containing(GeoPoint::new(20.0, 20.0)).unwrap_err();
        assert!(matches!(err, CarbonError::NoRegionFound { .. }));
    }
}
