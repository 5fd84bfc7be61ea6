//! # rainbox-anchors
//!
//! Bookmark anchoring for rendered emails: capture a text selection as a
//! durable, path-addressed anchor, then find and highlight it again after
//! the email has been rendered from scratch.
//!
//! - [`address`]: boundary points as child-index paths from the container
//! - [`paint`]: resolve anchors to live ranges and wrap them in highlights
//! - [`capture`]: turn the user's selection into a pending anchor
//! - [`interaction`]: pointer hit-testing over painted highlights
//! - [`book`]: per-document anchor lifecycle with optimistic store updates
//! - [`engine`]: the facade a host UI talks to
//!
//! ```
//! use rainbox_anchors::{AnchorEngine, DocumentId};
//! use rainbox_anchors::dom::{Boundary, Range};
//!
//! let mut engine = AnchorEngine::new(DocumentId::new("mail-1"));
//! engine.load("<p>Hello world</p>");
//!
//! let p = engine.dom().children(engine.container())[0];
//! let text = engine.dom().children(p)[0];
//! engine
//!     .dom_mut()
//!     .set_selection(Range::new(Boundary::new(text, 6), Boundary::new(text, 11)));
//!
//! let capture = engine.capture_selection().unwrap();
//! assert_eq!(capture.anchor.text, "world");
//! assert_eq!(capture.anchor.address.start.path, vec![0, 0]);
//! ```

pub mod address;
pub mod book;
pub mod capture;
pub mod dom;
pub mod engine;
pub mod geometry;
pub mod interaction;
pub mod model;
pub mod paint;
pub mod store;

pub use address::{Address, AddressError, Endpoint, NodeHint};
pub use book::{AnchorBook, Command, CommandError, OpId, StoreAck, StoreRequest};
pub use capture::{Capture, capture_selection};
pub use engine::{AnchorEngine, EngineEvent};
pub use geometry::Rect;
pub use interaction::{Interaction, PointerTracker};
pub use model::{Anchor, AnchorId, AnchorPatch, AnchorState, DocumentId, Labels};
pub use paint::{Highlight, PaintOptions, RenderReport, ResolveFailure, resolve_and_render};
pub use store::{AnchorStore, JsonFileStore, MemoryStore, StoreError};
