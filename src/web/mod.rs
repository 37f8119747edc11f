//! wasm-bindgen bridge over [`crate::resolver::SnapResolver`]: a thin
//! `#[wasm_bindgen]` struct around the native type with JS-friendly
//! (`f64`/`String`) argument types.

use wasm_bindgen::prelude::wasm_bindgen;

use crate::config::PartialConfig;
use crate::geometry::{Aabb, Point};
use crate::resolver::SnapResolver;
use crate::types::{OwnerRef, SnapKind, SnapPoint, SnapPointId};

#[wasm_bindgen]
pub struct JsSnapResolver(SnapResolver);

#[wasm_bindgen]
impl JsSnapResolver {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self(SnapResolver::new(Aabb::new(min_x, min_y, max_x - min_x, max_y - min_y)))
    }

    /// `kind` is one of `"endpoint"`, `"midpoint"`, `"centerline"`. Other
    /// kinds (`Intersection`) carry owner pairs not expressible through this
    /// flat JS signature and are added through the native API instead.
    #[wasm_bindgen(js_name = addEndpoint)]
    pub fn add_endpoint(&mut self, id: String, x: f64, y: f64, owner_kind: String, owner_id: String, is_start: bool, is_end: bool, now_ms: f64) {
        let point = SnapPoint::new(
            SnapPointId::new(id),
            SnapKind::Endpoint { is_start, is_end },
            Point::new(x, y),
            OwnerRef::new(owner_kind, owner_id),
        );
        self.0.add_snap_point(point, now_ms as u64);
    }

    #[wasm_bindgen(js_name = addMidpoint)]
    pub fn add_midpoint(&mut self, id: String, x: f64, y: f64, owner_kind: String, owner_id: String, now_ms: f64) {
        let point = SnapPoint::new(SnapPointId::new(id), SnapKind::Midpoint, Point::new(x, y), OwnerRef::new(owner_kind, owner_id));
        self.0.add_snap_point(point, now_ms as u64);
    }

    #[wasm_bindgen(js_name = addCenterlineSample)]
    pub fn add_centerline_sample(&mut self, id: String, x: f64, y: f64, owner_kind: String, owner_id: String, sample_index: u32, now_ms: f64) {
        let point = SnapPoint::new(
            SnapPointId::new(id),
            SnapKind::Centerline { sample_index },
            Point::new(x, y),
            OwnerRef::new(owner_kind, owner_id),
        );
        self.0.add_snap_point(point, now_ms as u64);
    }

    pub fn remove(&mut self, id: String, now_ms: f64) {
        self.0.remove_snap_point(&SnapPointId::new(id), now_ms as u64);
    }

    pub fn clear(&mut self, now_ms: f64) {
        self.0.clear(now_ms as u64);
    }

    #[wasm_bindgen(js_name = updateModifierKeys)]
    pub fn update_modifier_keys(&mut self, ctrl: bool, alt: bool, shift: bool) {
        self.0.update_modifier_keys(ctrl, alt, shift);
    }

    /// Returns the query outcome serialized as JSON (`SnapResult`) since
    /// wasm-bindgen can't return an arbitrary Rust struct by value.
    #[wasm_bindgen(js_name = findClosest)]
    pub fn find_closest(&mut self, x: f64, y: f64, now_ms: f64) -> String {
        let result = self.0.find_closest((x, y), &[], now_ms as u64);
        serde_json::to_string(&result).unwrap_or_else(|_| "null".to_string())
    }

    /// `config_json` is a JSON-encoded `PartialConfig`; returns `true` on
    /// success, `false` if validation rejected the update.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, config_json: String) -> bool {
        match serde_json::from_str::<PartialConfig>(&config_json) {
            Ok(partial) => self.0.set_config(partial).is_ok(),
            Err(_) => false,
        }
    }

    #[wasm_bindgen(js_name = getConfig)]
    pub fn get_config(&self) -> String {
        serde_json::to_string(&self.0.config()).unwrap_or_else(|_| "null".to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
