//! Indirect resource table: an immutable, GPU-visible list of buffer
//! references that a shader reads by index.

use crate::backend::{Backend, RenderError};

/// One named slot in a resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    pub index: u32,
    pub label: &'static str,
}

/// Indices a shader reads from; dense from 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    entries: Vec<TableEntry>,
}

impl TableLayout {
    /// Build a layout from labels; entry `i` lives at index `i`.
    pub fn new(labels: &[&'static str]) -> Self {
        let entries = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| TableEntry {
                index: i as u32,
                label,
            })
            .collect();
        Self { entries }
    }

    /// Table read by the indirect stage: positions at 0, colors at 1.
    pub fn geometry() -> Self {
        Self::new(&["positions", "colors"])
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resource table built once at startup and read-only afterwards. There is
/// no way to rebind an entry; build a new table instead.
pub struct IndirectResourceTable<B: Backend> {
    raw: B::ResourceTable,
    layout: TableLayout,
}

impl<B: Backend> IndirectResourceTable<B> {
    /// Encode `buffers` at the indices of `layout`, one buffer per entry.
    pub fn construct(
        backend: &B,
        pipeline: &B::Pipeline,
        layout: TableLayout,
        buffers: &[&B::Buffer],
    ) -> Result<Self, RenderError> {
        if buffers.len() != layout.len() {
            return Err(RenderError::TableLayout {
                expected: layout.len(),
                got: buffers.len(),
            });
        }
        let raw = backend.create_resource_table(pipeline, &layout, buffers)?;
        tracing::debug!(entries = layout.len(), "resource table encoded");
        Ok(Self { raw, layout })
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Backend handle bound at draw time.
    pub fn raw(&self) -> &B::ResourceTable {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferDesc, BufferUsage, PipelineDesc};
    use crate::headless::HeadlessBackend;
    use lumen_common::Stage;

    #[test]
    fn geometry_layout_is_dense() {
        let layout = TableLayout::geometry();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.entries()[0].label, "positions");
        assert_eq!(layout.entries()[1].index, 1);
    }

    #[test]
    fn construct_records_references_in_layout_order() {
        let backend = HeadlessBackend::default();
        let pipeline = backend
            .create_pipeline(&PipelineDesc::for_stage(Stage::Indirect))
            .unwrap();
        let a = backend
            .create_buffer(&BufferDesc::init("a", BufferUsage::Storage, &[0; 16]))
            .unwrap();
        let b = backend
            .create_buffer(&BufferDesc::init("b", BufferUsage::Storage, &[0; 16]))
            .unwrap();

        let table =
            IndirectResourceTable::construct(&backend, &pipeline, TableLayout::geometry(), &[&b, &a])
                .unwrap();
        assert_eq!(table.raw().references(), &[b.id(), a.id()]);
    }

    #[test]
    fn construct_rejects_count_mismatch() {
        let backend = HeadlessBackend::default();
        let pipeline = backend
            .create_pipeline(&PipelineDesc::for_stage(Stage::Indirect))
            .unwrap();
        let a = backend
            .create_buffer(&BufferDesc::init("a", BufferUsage::Storage, &[0; 16]))
            .unwrap();

        let err = IndirectResourceTable::construct(&backend, &pipeline, TableLayout::geometry(), &[&a])
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::TableLayout { expected: 2, got: 1 }));
    }
}
