use serde_json::json;
use trail_map::geometry::{
    extend, extend_from_feature_collection, extend_from_geometry, Coordinates, LngLat,
    LngLatBounds,
};

fn count_leaves(value: &serde_json::Value) -> usize {
    match value.as_array() {
        Some(items) if items.first().map_or(false, |v| v.is_number()) => 1,
        Some(items) => items.iter().map(count_leaves).sum(),
        None => 0,
    }
}

#[test]
fn every_leaf_visited_once_at_any_depth() {
    let shapes = [
        json!([-73.3, 42.3]),
        json!([[-73.3, 42.3], [-73.2, 42.4]]),
        json!([[[-73.3, 42.3], [-73.2, 42.3], [-73.2, 42.4], [-73.3, 42.3]]]),
        json!([
            [[[-73.3, 42.3], [-73.2, 42.3], [-73.3, 42.3]]],
            [[[-73.1, 42.1], [-73.0, 42.5], [-73.1, 42.1]], [[-73.05, 42.2], [-73.04, 42.3]]]
        ]),
    ];
    for shape in &shapes {
        let coords = Coordinates::from_json(shape).unwrap();
        let mut bounds = LngLatBounds::new();
        assert_eq!(extend(&mut bounds, &coords), count_leaves(shape));
        let mut leaves = Vec::new();
        coords.for_each_position(&mut |p| leaves.push(p));
        for p in leaves {
            assert!(bounds.contains(p));
        }
    }
}

#[test]
fn elevation_in_position_is_ignored() {
    let coords = Coordinates::from_json(&json!([[-73.3, 42.3, 410.0], [-73.2, 42.4, 420.0]]))
        .unwrap();
    let mut bounds = LngLatBounds::new();
    assert_eq!(extend(&mut bounds, &coords), 2);
    assert_eq!(bounds.south_west(), Some(LngLat::new(-73.3, 42.3)));
    assert_eq!(bounds.north_east(), Some(LngLat::new(-73.2, 42.4)));
}

#[test]
fn geometry_collection_members_are_walked() {
    let geometry: geojson::Geometry = serde_json::from_value(json!({
        "type": "GeometryCollection",
        "geometries": [
            { "type": "Point", "coordinates": [1.0, 2.0] },
            { "type": "LineString", "coordinates": [[3.0, 4.0], [5.0, -6.0]] }
        ]
    }))
    .unwrap();
    let mut bounds = LngLatBounds::new();
    assert_eq!(extend_from_geometry(&mut bounds, &geometry), 3);
    assert_eq!(bounds.south_west(), Some(LngLat::new(1.0, -6.0)));
    assert_eq!(bounds.north_east(), Some(LngLat::new(5.0, 4.0)));
}

#[test]
fn features_without_geometry_are_skipped() {
    let fc: geojson::FeatureCollection = serde_json::from_value(json!({
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": {}, "geometry": null },
            { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [1.0, 1.0] } }
        ]
    }))
    .unwrap();
    let mut bounds = LngLatBounds::new();
    assert!(extend_from_feature_collection(&mut bounds, &fc));
    assert_eq!(bounds.center(), Some(LngLat::new(1.0, 1.0)));

    let empty: geojson::FeatureCollection = serde_json::from_value(json!({
        "type": "FeatureCollection",
        "features": [{ "type": "Feature", "properties": {}, "geometry": null }]
    }))
    .unwrap();
    let mut bounds = LngLatBounds::new();
    assert!(!extend_from_feature_collection(&mut bounds, &empty));
    assert!(bounds.is_empty());
}
