use crate::metadata::{CodeRange, Metadata};
use crate::segment::CodeSegment;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// A code segment together with the metadata it was compiled with.
pub struct Code {
    segment: RefCell<CodeSegment>,
    metadata: Rc<Metadata>,
}

pub type SharedCode = Rc<Code>;

impl Code {
    pub fn new(segment: CodeSegment, metadata: Metadata) -> SharedCode {
        Rc::new(Self {
            segment: RefCell::new(segment),
            metadata: Rc::new(metadata),
        })
    }

    pub fn metadata(&self) -> &Rc<Metadata> {
        &self.metadata
    }

    pub fn segment(&self) -> Ref<'_, CodeSegment> {
        self.segment.borrow()
    }

    pub fn segment_mut(&self) -> RefMut<'_, CodeSegment> {
        self.segment.borrow_mut()
    }

    pub fn lookup_range(&self, offset: u32) -> Option<&CodeRange> {
        self.metadata.lookup_range(offset)
    }
}
