//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Inputs
//! - Templates and invoices are passed as pointer + length UTF-8 buffers.
//!   The invoice is JSON (`{"id":…,"date":"YYYY-MM-DD","client":{…},"billables":[…]}`).
//! - Options are an optional null-terminated camelCase JSON object; `NULL`
//!   selects the defaults.
//!
//! ## Memory management
//! - Buffers and strings returned by `docket_*` functions are allocated on the
//!   Rust heap. Callers **must** free them with `docket_free_buffer` /
//!   `docket_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int`: `0` on success, otherwise one
//!   of the `DOCKET_ERR_*` codes.
//! - Error details can be retrieved via `docket_last_error`, which is
//!   thread-local.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -ldocket_pdf
//! // #include "docket.h"
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::error::DocketError;
use crate::invoice::Invoice;
use crate::pipeline::{generate_invoice_pdf, render_invoice_html, Backend, DocketOptions};
use crate::template::Template;

pub const DOCKET_OK: c_int = 0;
pub const DOCKET_ERR_NULL_POINTER: c_int = 1;
pub const DOCKET_ERR_INVALID_UTF8: c_int = 2;
pub const DOCKET_ERR_VALIDATION: c_int = 3;
pub const DOCKET_ERR_TEMPLATE: c_int = 4;
pub const DOCKET_ERR_RENDER: c_int = 5;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn fail(code: c_int, msg: &str) -> c_int {
    log::debug!("ffi error {code}: {msg}");
    set_last_error(msg);
    code
}

fn error_code(err: &DocketError) -> c_int {
    match err {
        DocketError::Validation(_) => DOCKET_ERR_VALIDATION,
        DocketError::Template(_) => DOCKET_ERR_TEMPLATE,
        DocketError::Render(_) => DOCKET_ERR_RENDER,
    }
}

/// Rendering engine for [`docket_generate_pdf`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocketBackend {
    /// In-process renderer; no browser needed.
    Native = 0,
    /// Headless Chrome; requires the `chrome` feature and a browser binary.
    Chrome = 1,
}

impl From<DocketBackend> for Backend {
    fn from(backend: DocketBackend) -> Self {
        match backend {
            DocketBackend::Native => Backend::Native,
            DocketBackend::Chrome => Backend::Chrome,
        }
    }
}

/// Everything a call needs, decoded from raw arguments.
struct Request {
    template: Template,
    invoice: Invoice,
    options: DocketOptions,
}

/// # Safety
/// `ptr` must point to `len` readable bytes.
unsafe fn utf8_arg<'a>(ptr: *const u8, len: u32, what: &str) -> Result<&'a str, c_int> {
    let bytes = slice::from_raw_parts(ptr, len as usize);
    std::str::from_utf8(bytes)
        .map_err(|e| fail(DOCKET_ERR_INVALID_UTF8, &format!("Invalid UTF-8 in {what}: {e}")))
}

/// # Safety
/// Pointer arguments must satisfy the contracts of the exported functions.
unsafe fn decode_request(
    template_ptr: *const u8,
    template_len: u32,
    invoice_ptr: *const u8,
    invoice_len: u32,
    options_json: *const c_char,
    fragment: bool,
) -> Result<Request, c_int> {
    let source = utf8_arg(template_ptr, template_len, "template")?;
    let invoice_json = utf8_arg(invoice_ptr, invoice_len, "invoice")?;

    let options = if options_json.is_null() {
        DocketOptions::default()
    } else {
        let json = CStr::from_ptr(options_json)
            .to_str()
            .map_err(|e| fail(DOCKET_ERR_INVALID_UTF8, &format!("Invalid UTF-8 in options: {e}")))?;
        DocketOptions::from_json(json).map_err(|e| fail(DOCKET_ERR_VALIDATION, &e.to_string()))?
    };

    let invoice =
        Invoice::from_json(invoice_json).map_err(|e| fail(DOCKET_ERR_VALIDATION, &e.to_string()))?;
    let template = options
        .template(source, fragment)
        .map_err(|e| fail(error_code(&e), &e.to_string()))?;

    Ok(Request {
        template,
        invoice,
        options,
    })
}

fn into_c_string(s: String) -> *mut c_char {
    CString::new(s.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Substitute an invoice into a template and return the HTML.
///
/// # Parameters
/// - `template_ptr`, `template_len`: UTF-8 template
/// - `invoice_ptr`, `invoice_len`: UTF-8 invoice JSON
/// - `options_json`: null-terminated options JSON, or `NULL`
/// - `fragment`: wrap the template in the page shell
/// - `out_html`: receives a null-terminated HTML string
/// - `out_filename`: receives the suggested file name; may be `NULL`
///
/// # Safety
/// - Input pointers must point to the given number of valid bytes.
/// - `out_html` must be a valid pointer.
/// - Returned strings must be freed with `docket_free_string`.
#[no_mangle]
pub unsafe extern "C" fn docket_render_html(
    template_ptr: *const u8,
    template_len: u32,
    invoice_ptr: *const u8,
    invoice_len: u32,
    options_json: *const c_char,
    fragment: bool,
    out_html: *mut *mut c_char,
    out_filename: *mut *mut c_char,
) -> c_int {
    if template_ptr.is_null() || invoice_ptr.is_null() || out_html.is_null() {
        return fail(DOCKET_ERR_NULL_POINTER, "Null pointer argument");
    }

    let request = match decode_request(
        template_ptr,
        template_len,
        invoice_ptr,
        invoice_len,
        options_json,
        fragment,
    ) {
        Ok(r) => r,
        Err(code) => return code,
    };

    match render_invoice_html(&request.template, &request.invoice, &request.options) {
        Ok(rendered) => {
            *out_html = into_c_string(rendered.html);
            if !out_filename.is_null() {
                *out_filename = into_c_string(rendered.filename);
            }
            DOCKET_OK
        }
        Err(e) => fail(error_code(&e), &e.to_string()),
    }
}

/// Substitute an invoice into a template and render it to PDF.
///
/// # Parameters
/// - template, invoice, options and `fragment`: as for `docket_render_html`
/// - `backend`: rendering engine
/// - `out_buf`, `out_len`: receive the PDF bytes
/// - `out_filename`: receives the suggested file name; may be `NULL`
///
/// # Returns
/// `0` on success. On error, call `docket_last_error`.
///
/// # Safety
/// - Input pointers must point to the given number of valid bytes.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` with `docket_free_buffer` and
///   `*out_filename` with `docket_free_string`.
#[no_mangle]
pub unsafe extern "C" fn docket_generate_pdf(
    template_ptr: *const u8,
    template_len: u32,
    invoice_ptr: *const u8,
    invoice_len: u32,
    options_json: *const c_char,
    fragment: bool,
    backend: DocketBackend,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
    out_filename: *mut *mut c_char,
) -> c_int {
    if template_ptr.is_null() || invoice_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        return fail(DOCKET_ERR_NULL_POINTER, "Null pointer argument");
    }

    let request = match decode_request(
        template_ptr,
        template_len,
        invoice_ptr,
        invoice_len,
        options_json,
        fragment,
    ) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let result = Backend::from(backend).renderer().and_then(|renderer| {
        generate_invoice_pdf(
            &request.template,
            &request.invoice,
            &request.options,
            renderer.as_ref(),
        )
    });

    match result {
        Ok(pdf) => {
            let len = pdf.bytes.len() as u32;
            let buf = pdf.bytes.into_boxed_slice();
            *out_buf = Box::into_raw(buf) as *mut u8;
            *out_len = len;
            if !out_filename.is_null() {
                *out_filename = into_c_string(pdf.filename);
            }
            DOCKET_OK
        }
        Err(e) => fail(error_code(&e), &e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a buffer returned by `docket_generate_pdf`.
///
/// # Safety
/// `buf` and `len` must come from a single successful call.
#[no_mangle]
pub unsafe extern "C" fn docket_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by a `docket_*` function.
///
/// # Safety
/// `s` must come from this library and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn docket_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Message of the last error on this thread, or `NULL`. Owned by the
/// library; valid until the next failing call on the same thread.
#[no_mangle]
pub extern "C" fn docket_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Library version as a static null-terminated string.
#[no_mangle]
pub extern "C" fn docket_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &[u8] =
        b"<h1>{{id}} {{client.name}}</h1><!--BILLABLE--><p>{{title}} {{utils.subtotal}}</p><!--BILLABLE--><p>{{utils.total}}</p>";
    const INVOICE: &[u8] = br#"{"id":1,"date":"2024-05-01","client":{"name":"Acme","address":""},"billables":[{"title":"Design","description":"","hours":2,"rate":50}]}"#;

    fn last_error() -> String {
        let p = docket_last_error();
        assert!(!p.is_null());
        unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
    }

    #[test]
    fn ffi_render_html() {
        let mut html: *mut c_char = ptr::null_mut();
        let mut filename: *mut c_char = ptr::null_mut();
        let rc = unsafe {
            docket_render_html(
                TEMPLATE.as_ptr(),
                TEMPLATE.len() as u32,
                INVOICE.as_ptr(),
                INVOICE.len() as u32,
                ptr::null(),
                false,
                &mut html,
                &mut filename,
            )
        };
        assert_eq!(rc, DOCKET_OK);

        let text = unsafe { CStr::from_ptr(html) }.to_str().unwrap().to_string();
        let name = unsafe { CStr::from_ptr(filename) }.to_str().unwrap().to_string();
        assert_eq!(text, "<h1>1 Acme</h1><p>Design 100</p><p>100</p>");
        assert_eq!(name, "2024-05-01.pdf");

        unsafe {
            docket_free_string(html);
            docket_free_string(filename);
        }
    }

    #[test]
    fn ffi_generate_pdf() {
        let options = CString::new(r#"{"pageFormat":"letter","filename":"acme.pdf"}"#).unwrap();
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;
        let mut filename: *mut c_char = ptr::null_mut();

        let rc = unsafe {
            docket_generate_pdf(
                TEMPLATE.as_ptr(),
                TEMPLATE.len() as u32,
                INVOICE.as_ptr(),
                INVOICE.len() as u32,
                options.as_ptr(),
                false,
                DocketBackend::Native,
                &mut out_buf,
                &mut out_len,
                &mut filename,
            )
        };

        assert_eq!(rc, DOCKET_OK, "Expected success");
        assert!(!out_buf.is_null());
        assert!(out_len > 100);

        // Verify PDF header
        let bytes = unsafe { slice::from_raw_parts(out_buf, out_len as usize) };
        assert_eq!(&bytes[0..5], b"%PDF-");
        assert_eq!(unsafe { CStr::from_ptr(filename) }.to_str().unwrap(), "acme.pdf");

        unsafe {
            docket_free_buffer(out_buf, out_len);
            docket_free_string(filename);
        }
    }

    #[test]
    fn ffi_null_input() {
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;
        let rc = unsafe {
            docket_generate_pdf(
                ptr::null(),
                0,
                INVOICE.as_ptr(),
                INVOICE.len() as u32,
                ptr::null(),
                false,
                DocketBackend::Native,
                &mut out_buf,
                &mut out_len,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, DOCKET_ERR_NULL_POINTER);
        assert_eq!(last_error(), "Null pointer argument");
    }

    #[test]
    fn ffi_malformed_template() {
        let template = b"<p>{{id}}</p>";
        let mut html: *mut c_char = ptr::null_mut();
        let rc = unsafe {
            docket_render_html(
                template.as_ptr(),
                template.len() as u32,
                INVOICE.as_ptr(),
                INVOICE.len() as u32,
                ptr::null(),
                false,
                &mut html,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, DOCKET_ERR_TEMPLATE);
        assert!(html.is_null());
        assert!(last_error().contains("BILLABLE"));
    }

    #[test]
    fn ffi_invalid_invoice_and_utf8() {
        let bad_json = br#"{"id":1}"#;
        let mut html: *mut c_char = ptr::null_mut();
        let rc = unsafe {
            docket_render_html(
                TEMPLATE.as_ptr(),
                TEMPLATE.len() as u32,
                bad_json.as_ptr(),
                bad_json.len() as u32,
                ptr::null(),
                false,
                &mut html,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, DOCKET_ERR_VALIDATION);

        let bad_utf8 = [0xffu8, 0xfe];
        let rc = unsafe {
            docket_render_html(
                bad_utf8.as_ptr(),
                bad_utf8.len() as u32,
                INVOICE.as_ptr(),
                INVOICE.len() as u32,
                ptr::null(),
                false,
                &mut html,
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, DOCKET_ERR_INVALID_UTF8);
    }

    #[test]
    fn ffi_version() {
        let v = unsafe { CStr::from_ptr(docket_version()) };
        assert_eq!(v.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
