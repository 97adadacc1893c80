#![allow(dead_code)]

use serde_json::{json, Value};
use trail_map::io::MemorySource;

pub const PARCEL_INSIDE: [f64; 2] = [-73.295, 42.355];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn collection(features: Vec<Value>) -> String {
    json!({ "type": "FeatureCollection", "features": features }).to_string()
}

pub fn line(coords: &[[f64; 2]], properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": { "type": "LineString", "coordinates": coords }
    })
}

pub fn point(at: [f64; 2], properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": { "type": "Point", "coordinates": at }
    })
}

pub fn square(min: [f64; 2], max: [f64; 2], properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [min[0], min[1]], [max[0], min[1]], [max[0], max[1]],
                [min[0], max[1]], [min[0], min[1]]
            ]]
        }
    })
}

/// Every default overlay file around Lenox, MA.
pub fn overlay_files() -> Vec<(&'static str, String)> {
    vec![
        (
            "trails.geojson",
            collection(vec![line(
                &[[-73.32, 42.36], [-73.31, 42.365]],
                json!({ "Name": "Ridge Trail" }),
            )]),
        ),
        (
            "extant_sidewalks.geojson",
            collection(vec![line(&[[-73.285, 42.357], [-73.284, 42.358]], json!({}))]),
        ),
        (
            "proposed_sidewalks.geojson",
            collection(vec![line(&[[-73.286, 42.356], [-73.285, 42.356]], json!({}))]),
        ),
        (
            "proposed_shared_use_paths.geojson",
            collection(vec![line(&[[-73.30, 42.37], [-73.29, 42.372]], json!({}))]),
        ),
        (
            "POI.geojson",
            collection(vec![
                point([-73.287, 42.359], json!({ "Name": "Parking" })),
                point([-73.288, 42.360], json!({ "Name": "Library" })),
            ]),
        ),
        (
            "parcels.geojson",
            collection(vec![square(
                [-73.30, 42.35],
                [-73.29, 42.36],
                json!({
                    "MAP_PAR_ID": "12-34",
                    "parcel_owners_Owner Name": "Town of Lenox",
                    "parcel_owners_Property Address": "6 Walker St"
                }),
            )]),
        ),
        (
            "easements.geojson",
            collection(vec![square([-73.296, 42.352], [-73.294, 42.354], json!({}))]),
        ),
        (
            "1400_ft_contour.geojson",
            collection(vec![line(
                &[[-73.33, 42.34], [-73.32, 42.345]],
                json!({ "ELEV": 1400 }),
            )]),
        ),
    ]
}

pub fn dataset() -> MemorySource {
    let mut source = MemorySource::new();
    for (path, contents) in overlay_files() {
        source.insert(path, contents);
    }
    source
}

pub fn dataset_without(missing: &str) -> MemorySource {
    let mut source = dataset();
    source.remove(missing);
    source
}
