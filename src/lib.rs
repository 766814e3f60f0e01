//! # docket-pdf – invoice templates → PDF
//!
//! Turns an HTML invoice template and an [`Invoice`] record into a
//! downloadable PDF. The stages are:
//!
//! 1. **Parse** – split the template around its `<!--BILLABLE-->` block
//!    ([`template`])
//! 2. **Substitute** – scalar, billable, utility and custom placeholder
//!    passes over the invoice ([`template`], [`fields`])
//! 3. **Render** – load the HTML into a rendering session and print it
//!    ([`renderer`]), either in headless Chrome ([`chrome`], default feature)
//!    or in-process with printpdf ([`native`])
//!
//! [`pipeline::generate_invoice_pdf`] runs all of them from a single
//! [`DocketOptions`] record. A C-compatible FFI surface is exposed via the
//! [`ffi`] module.

pub mod dates;
pub mod error;
pub mod ffi;
pub mod fields;
pub mod invoice;
pub mod markup;
pub mod native;
pub mod pipeline;
pub mod renderer;
pub mod template;
pub mod templates;
pub mod utils;

#[cfg(feature = "chrome")]
pub mod chrome;

// Re-exports for convenience
pub use dates::InvoiceDate;
pub use error::{DocketError, RenderError, TemplateError, ValidationError};
pub use invoice::{Client, Invoice, LineItem};
pub use pipeline::{generate_invoice_pdf, Backend, DocketOptions, DocketPdf};
pub use renderer::{DocumentRenderer, PageFormat, RenderOptions, Renderer};
pub use template::{ContentOptions, RenderedHtml, Template, TemplateOptions, UnresolvedPolicy};
