//! C-compatible bindings over [`meshnn_core::Index`] (spec §6's external
//! FFI surface).
//!
//! All functions are panic-safe: a panic inside the index is caught at the
//! boundary by [`ffi_guard`] and reported as a thread-local error message
//! rather than unwinding into C. Every fallible function documents its own
//! sentinel failure value; callers should not assume zero-initialized
//! buffers mean success.
//!
//! # Thread safety
//!
//! [`meshnn_core::Index`] itself is internally synchronized (spec §5) and
//! safe to call concurrently through `meshnn_add`/`meshnn_knn_query`/etc.
//! from multiple threads against the same handle. The error message is
//! thread-local, so a failure observed on one thread never clobbers another
//! thread's `meshnn_last_error_message()`.

use libc::{c_char, c_float, c_int, size_t};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ptr;
use std::slice;

use meshnn_core::{DistanceMetric, Index, IndexParams};

type CoreIndex = Index<Vec<f32>, f32>;

struct MeshnnIndexState {
    inner: CoreIndex,
    dim: u32,
    metric: DistanceMetric,
}

/// Opaque handle to a `meshnn` index. C code only ever sees a pointer to
/// this type; the real state lives in [`MeshnnIndexState`].
#[repr(C)]
pub struct MeshnnIndex {
    _private: [u8; 0],
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = RefCell::new(None);
}

fn set_last_error(err: impl std::fmt::Display) {
    LAST_ERROR.with(|cell| {
        let safe_msg = err.to_string().replace('\0', "\\0");
        *cell.borrow_mut() = Some(CString::new(safe_msg).unwrap_or_default());
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
}

/// Catches a panic before it can unwind across the FFI boundary, converting
/// it to a thread-local error message and `None`.
fn ffi_guard<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => Some(result),
        Err(e) => {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                format!("panic: {s}")
            } else if let Some(s) = e.downcast_ref::<String>() {
                format!("panic: {s}")
            } else {
                "panic: unknown payload".to_string()
            };
            set_last_error(msg);
            None
        }
    }
}

fn metric_from_u8(metric: u8) -> Option<DistanceMetric> {
    match metric {
        0 => Some(DistanceMetric::Cosine),
        1 => Some(DistanceMetric::SquaredEuclidean),
        2 => Some(DistanceMetric::NegDotProduct),
        _ => None,
    }
}

//
// === LIFECYCLE ===
//

/// Creates an index over `dim`-dimensional `f32` vectors.
///
/// `metric` selects the distance function: `0` cosine, `1` squared
/// Euclidean, `2` negated dot product. Every other parameter mirrors
/// [`meshnn_core::IndexParams`]; pass `0`/negative to take that field's
/// default (`max_edges`, `ef_construction`, `ef_search`, `collection_size`
/// fall back to [`IndexParams::default`] on `0`; `random_seed < 0` already
/// means OS entropy per [`IndexParams`]).
///
/// # Returns
///
/// A non-NULL handle on success, or NULL on failure (check
/// [`meshnn_last_error_message`]).
///
/// # Safety
///
/// The returned pointer must eventually be passed to exactly one
/// [`meshnn_free`] call and must not be used afterward.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_create(
    dim: u32,
    metric: u8,
    max_edges: u32,
    ef_construction: u32,
    ef_search: u32,
    collection_size: u64,
    random_seed: i64,
    allow_removals: c_int,
    zero_layer_guaranteed: c_int,
) -> *mut MeshnnIndex {
    ffi_guard(|| {
        if dim == 0 {
            set_last_error("dim must be > 0");
            return ptr::null_mut();
        }
        let Some(metric) = metric_from_u8(metric) else {
            set_last_error("metric must be 0 (cosine), 1 (squared euclidean), or 2 (neg dot product)");
            return ptr::null_mut();
        };

        let defaults = IndexParams::default();
        let mut params = defaults
            .with_allow_removals(allow_removals != 0)
            .with_max_edges(if max_edges == 0 { defaults.max_edges } else { max_edges as usize })
            .with_ef_construction(if ef_construction == 0 {
                defaults.ef_construction
            } else {
                ef_construction as usize
            })
            .with_ef_search(if ef_search == 0 { defaults.ef_search } else { ef_search as usize });
        params.collection_size =
            if collection_size == 0 { defaults.collection_size } else { collection_size as usize };
        params.random_seed = random_seed;
        params.zero_layer_guaranteed = zero_layer_guaranteed != 0;

        if let Err(e) = params.validate() {
            set_last_error(e);
            return ptr::null_mut();
        }

        let inner = CoreIndex::new(params, metric.into_fn());
        clear_last_error();
        let state = Box::new(MeshnnIndexState { inner, dim, metric });
        Box::into_raw(state) as *mut MeshnnIndex
    })
    .unwrap_or(ptr::null_mut())
}

/// Frees an index. Safe to call with NULL (no-op).
///
/// # Safety
///
/// `ptr` must be NULL or a valid pointer previously returned by
/// [`meshnn_create`]/[`meshnn_load`], not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_free(ptr: *mut MeshnnIndex) {
    if !ptr.is_null() {
        ffi_guard(|| {
            let _ = unsafe { Box::from_raw(ptr as *mut MeshnnIndexState) };
        });
    }
}

//
// === MUTATION ===
//

/// Adds one vector. Returns its node id, or `UINT64_MAX` on failure: either
/// a NULL/dimension-mismatched argument, or a layer-sampling veto (possible
/// only when the index was created with `zero_layer_guaranteed = 0`, in
/// which case the vector was not stored).
///
/// # Safety
///
/// `ptr` must be a valid handle; `vector` must point to `len` valid `f32`s.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_add(ptr: *mut MeshnnIndex, vector: *const c_float, len: size_t) -> u64 {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *mut MeshnnIndexState).as_mut() }) else {
            set_last_error("null index pointer");
            return u64::MAX;
        };
        if vector.is_null() {
            set_last_error("null vector pointer");
            return u64::MAX;
        }
        if len as u32 != state.dim {
            set_last_error(format!("expected {}-dimensional vector, got {len}", state.dim));
            return u64::MAX;
        }
        let slice = unsafe { slice::from_raw_parts(vector, len) };
        match state.inner.add(slice.to_vec()) {
            Some(id) => {
                clear_last_error();
                u64::from(id)
            }
            None => {
                set_last_error("insert vetoed by layer sampling");
                u64::MAX
            }
        }
    })
    .unwrap_or(u64::MAX)
}

/// Removes the vector stored at `id`. Returns `0` on success, `-1` on
/// failure (id not live, or the index was created with
/// `allow_removals = 0`).
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_remove(ptr: *mut MeshnnIndex, id: u64) -> c_int {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *mut MeshnnIndexState).as_mut() }) else {
            set_last_error("null index pointer");
            return -1;
        };
        let Ok(node_id) = u32::try_from(id) else {
            set_last_error("id out of range");
            return -1;
        };
        match state.inner.remove(node_id) {
            Ok(()) => {
                clear_last_error();
                0
            }
            Err(e) => {
                set_last_error(e);
                -1
            }
        }
    })
    .unwrap_or(-1)
}

//
// === QUERIES ===
//

/// Finds up to `k` nearest neighbors of `query`, ascending by distance.
///
/// `out_ids`/`out_dists` must each have room for `k` elements; unfilled
/// trailing slots are left untouched.
///
/// # Returns
///
/// Number of results actually written (`<= k`), or `0` on failure (check
/// [`meshnn_last_error_message`]; an honest empty-index result is also
/// `0`, so check the error message to distinguish the two).
///
/// # Safety
///
/// `ptr` must be a valid handle; `query` must point to `len` valid `f32`s;
/// `out_ids` and `out_dists` must each point to `k` writable elements and
/// must not overlap `query` or each other.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_knn_query(
    ptr: *const MeshnnIndex,
    query: *const c_float,
    len: size_t,
    k: size_t,
    out_ids: *mut u64,
    out_dists: *mut c_float,
) -> size_t {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else {
            set_last_error("null index pointer");
            return 0;
        };
        if query.is_null() || out_ids.is_null() || out_dists.is_null() {
            set_last_error("null pointer argument");
            return 0;
        }
        if len as u32 != state.dim {
            set_last_error(format!("expected {}-dimensional vector, got {len}", state.dim));
            return 0;
        }
        if k == 0 {
            set_last_error("k must be > 0");
            return 0;
        }

        let slice = unsafe { slice::from_raw_parts(query, len) };
        match state.inner.knn(&slice.to_vec(), k) {
            Ok(results) => {
                clear_last_error();
                let ids = unsafe { slice::from_raw_parts_mut(out_ids, k) };
                let dists = unsafe { slice::from_raw_parts_mut(out_dists, k) };
                for (i, (id, dist)) in results.iter().enumerate() {
                    ids[i] = u64::from(*id);
                    dists[i] = *dist;
                }
                results.len()
            }
            Err(e) => {
                set_last_error(e);
                0
            }
        }
    })
    .unwrap_or(0)
}

/// Finds every vector within `radius` of `query`, ascending by distance,
/// writing at most `max_results` into `out_ids`/`out_dists`.
///
/// # Returns
///
/// Number of results actually written (`<= max_results`). A full buffer
/// does not distinguish "exactly `max_results` matches" from "more matches
/// were truncated"; widen `max_results` and re-query if that distinction
/// matters.
///
/// # Safety
///
/// `ptr` must be a valid handle; `query` must point to `len` valid `f32`s;
/// `out_ids` and `out_dists` must each point to `max_results` writable
/// elements.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_range_query(
    ptr: *const MeshnnIndex,
    query: *const c_float,
    len: size_t,
    radius: c_float,
    out_ids: *mut u64,
    out_dists: *mut c_float,
    max_results: size_t,
) -> size_t {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else {
            set_last_error("null index pointer");
            return 0;
        };
        if query.is_null() || (max_results > 0 && (out_ids.is_null() || out_dists.is_null())) {
            set_last_error("null pointer argument");
            return 0;
        }
        if len as u32 != state.dim {
            set_last_error(format!("expected {}-dimensional vector, got {len}", state.dim));
            return 0;
        }

        let slice = unsafe { slice::from_raw_parts(query, len) };
        match state.inner.range(&slice.to_vec(), radius) {
            Ok(results) => {
                clear_last_error();
                let n = results.len().min(max_results);
                if n > 0 {
                    let ids = unsafe { slice::from_raw_parts_mut(out_ids, n) };
                    let dists = unsafe { slice::from_raw_parts_mut(out_dists, n) };
                    for (i, (id, dist)) in results.iter().take(n).enumerate() {
                        ids[i] = u64::from(*id);
                        dists[i] = *dist;
                    }
                }
                n
            }
            Err(e) => {
                set_last_error(e);
                0
            }
        }
    })
    .unwrap_or(0)
}

//
// === RUNTIME-MUTABLE PARAMETERS (spec §6) ===
//

/// Overrides the query-time beam width (`efSearch`) for every search after
/// this call returns. Returns `0` on success, `-1` if `ptr` is NULL.
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_set_ef_search(ptr: *mut MeshnnIndex, value: u64) -> c_int {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *mut MeshnnIndexState).as_mut() }) else {
            set_last_error("null index pointer");
            return -1;
        };
        state.inner.set_ef_search(value as usize);
        clear_last_error();
        0
    })
    .unwrap_or(-1)
}

/// Overrides the insert-time beam width (`efConstruction`). Returns `0` on
/// success, `-1` if `ptr` is NULL.
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_set_ef_construction(ptr: *mut MeshnnIndex, value: u64) -> c_int {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *mut MeshnnIndexState).as_mut() }) else {
            set_last_error("null index pointer");
            return -1;
        };
        state.inner.set_ef_construction(value as usize);
        clear_last_error();
        0
    })
    .unwrap_or(-1)
}

/// Overrides the out-degree cap (`M`). Returns `0` on success, `-1` if
/// `ptr` is NULL.
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_set_max_edges(ptr: *mut MeshnnIndex, value: u64) -> c_int {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *mut MeshnnIndexState).as_mut() }) else {
            set_last_error("null index pointer");
            return -1;
        };
        state.inner.set_max_edges(value as usize);
        clear_last_error();
        0
    })
    .unwrap_or(-1)
}

//
// === INTROSPECTION ===
//

/// Number of live vectors.
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_len(ptr: *const MeshnnIndex) -> u64 {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else { return 0 };
        state.inner.len() as u64
    })
    .unwrap_or(0)
}

/// `1` if the index holds no vectors, `0` otherwise (including a NULL
/// handle).
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_is_empty(ptr: *const MeshnnIndex) -> c_int {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else { return 0 };
        c_int::from(state.inner.is_empty())
    })
    .unwrap_or(0)
}

/// The configured vector dimensionality, or `0` for a NULL handle.
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_dimensions(ptr: *const MeshnnIndex) -> u32 {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else { return 0 };
        state.dim
    })
    .unwrap_or(0)
}

/// The configured distance metric (`0` cosine, `1` squared Euclidean, `2`
/// negated dot product), or `255` for a NULL handle.
///
/// # Safety
///
/// `ptr` must be a valid handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_metric(ptr: *const MeshnnIndex) -> u8 {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else { return 255 };
        match state.metric {
            DistanceMetric::Cosine => 0,
            DistanceMetric::SquaredEuclidean => 1,
            DistanceMetric::NegDotProduct => 2,
        }
    })
    .unwrap_or(255)
}

//
// === PERSISTENCE ===
//

/// Serializes the index to `path` (spec §6.2's bincode snapshot format).
/// Returns `0` on success, `-1` on failure.
///
/// # Safety
///
/// `ptr` must be a valid handle; `path` must be a NULL-terminated UTF-8
/// string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_save(ptr: *const MeshnnIndex, path: *const c_char) -> c_int {
    ffi_guard(|| {
        let Some(state) = (unsafe { (ptr as *const MeshnnIndexState).as_ref() }) else {
            set_last_error("null index pointer");
            return -1;
        };
        let Some(path_str) = cstr_to_str(path) else { return -1 };
        let file = match File::create(path_str) {
            Ok(f) => f,
            Err(e) => {
                set_last_error(e);
                return -1;
            }
        };
        let mut writer = BufWriter::new(file);
        match state.inner.save(&mut writer) {
            Ok(()) => {
                clear_last_error();
                0
            }
            Err(e) => {
                set_last_error(e);
                -1
            }
        }
    })
    .unwrap_or(-1)
}

/// Loads an index previously written by [`meshnn_save`]. `dim` and `metric`
/// must match the index that produced the snapshot; they are not
/// themselves part of the snapshot, mirroring
/// [`meshnn_core::Index::load`]'s requirement that the distance function be
/// supplied fresh.
///
/// # Returns
///
/// A non-NULL handle on success, NULL on failure.
///
/// # Safety
///
/// `path` must be a NULL-terminated UTF-8 string. The returned pointer must
/// eventually be passed to exactly one [`meshnn_free`] call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn meshnn_load(path: *const c_char, dim: u32, metric: u8) -> *mut MeshnnIndex {
    ffi_guard(|| {
        let Some(metric) = metric_from_u8(metric) else {
            set_last_error("metric must be 0 (cosine), 1 (squared euclidean), or 2 (neg dot product)");
            return ptr::null_mut();
        };
        let Some(path_str) = cstr_to_str(path) else { return ptr::null_mut() };
        let file = match File::open(path_str) {
            Ok(f) => f,
            Err(e) => {
                set_last_error(e);
                return ptr::null_mut();
            }
        };
        let mut reader = BufReader::new(file);
        match CoreIndex::load(&mut reader, metric.into_fn(), meshnn_core::RelativeNeighborhood) {
            Ok(inner) => {
                clear_last_error();
                let state = Box::new(MeshnnIndexState { inner, dim, metric });
                Box::into_raw(state) as *mut MeshnnIndex
            }
            Err(e) => {
                set_last_error(e);
                ptr::null_mut()
            }
        }
    })
    .unwrap_or(ptr::null_mut())
}

/// # Safety
///
/// `path` must be NULL or a NULL-terminated string.
unsafe fn cstr_to_str<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        set_last_error("null path pointer");
        return None;
    }
    match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error("path must be valid UTF-8");
            None
        }
    }
}

//
// === ERRORS AND VERSION ===
//

/// The last error message recorded on the calling thread, or NULL if none.
/// Valid until the next `meshnn_*` call on this thread; do not free it.
#[unsafe(no_mangle)]
pub extern "C" fn meshnn_last_error_message() -> *const c_char {
    LAST_ERROR.with(|cell| cell.borrow().as_ref().map_or(ptr::null(), |s| s.as_ptr()))
}

/// The crate version string (e.g. `"0.3.0"`). Valid for the program's
/// lifetime; do not free it.
#[unsafe(no_mangle)]
pub extern "C" fn meshnn_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}
