// Schema: an ordered list of (name, type) fields plus a layout kind. Derived
// offsets/record size drive the Scan/Emit memory providers in nes-execution
// (spec §3, §4). Variable-sized fields are represented in-buffer by a
// VariableSizedAccess triple (nes-memory), which this module treats as an
// opaque 16-byte, 8-byte-aligned slot.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    I32,
    U32,
    I64,
    U64,
    F64,
    /// A VariableSizedAccess slot: 16 bytes, referencing a child buffer.
    VarSized,
}

impl DataType {
    pub const fn size(self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::I32 | DataType::U32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
            DataType::VarSized => 16,
        }
    }

    pub const fn align(self) -> usize {
        match self {
            DataType::Bool => 1,
            DataType::I32 | DataType::U32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
            DataType::VarSized => 8,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Field { name: name.into(), data_type }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Layout {
    Row,
    Columnar,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub layout: Layout,
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

impl Schema {
    pub fn new(layout: Layout, fields: Vec<Field>) -> Self {
        Schema { fields, layout }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Record size for ROW layout: fields packed in declaration order at
    /// their natural alignment (spec §6).
    pub fn row_size(&self) -> usize {
        let mut offset = 0usize;
        let mut max_align = 1usize;
        for field in &self.fields {
            let align = field.data_type.align();
            max_align = max_align.max(align);
            offset = align_up(offset, align) + field.data_type.size();
        }
        align_up(offset, max_align)
    }

    /// Byte offset of `field` within one ROW-layout record.
    pub fn row_field_offset(&self, field: usize) -> usize {
        let mut offset = 0usize;
        for f in &self.fields[..field] {
            offset = align_up(offset, f.data_type.align()) + f.data_type.size();
        }
        align_up(offset, self.fields[field].data_type.align())
    }

    /// Byte offset of the start of `field`'s array within a COLUMNAR buffer
    /// holding up to `capacity` tuples: each field gets a contiguous run of
    /// `capacity` natural-width slots, in declaration order.
    pub fn columnar_field_offset(&self, field: usize, capacity: usize) -> usize {
        self.fields[..field]
            .iter()
            .map(|f| f.data_type.size() * capacity)
            .sum()
    }

    /// Total bytes required to hold `capacity` tuples under this schema's
    /// layout.
    pub fn bytes_for_capacity(&self, capacity: usize) -> usize {
        match self.layout {
            Layout::Row => self.row_size() * capacity,
            Layout::Columnar => self
                .fields
                .iter()
                .map(|f| f.data_type.size() * capacity)
                .sum(),
        }
    }

    /// Maximum tuple count that fits in `buffer_size` bytes under this
    /// schema's layout (spec §3: "tuple count ≤ bufferSize / recordSize").
    pub fn capacity_for_buffer_size(&self, buffer_size: usize) -> usize {
        match self.layout {
            Layout::Row => {
                let record_size = self.row_size();
                if record_size == 0 { 0 } else { buffer_size / record_size }
            }
            Layout::Columnar => {
                let per_tuple: usize = self.fields.iter().map(|f| f.data_type.size()).sum();
                if per_tuple == 0 { 0 } else { buffer_size / per_tuple }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema(layout: Layout) -> Schema {
        Schema::new(
            layout,
            vec![
                Field::new("ts", DataType::U64),
                Field::new("k", DataType::I64),
                Field::new("v", DataType::I64),
            ],
        )
    }

    #[test]
    fn row_layout_packs_fields_at_natural_alignment() {
        let schema = sample_schema(Layout::Row);
        assert_eq!(schema.row_field_offset(0), 0);
        assert_eq!(schema.row_field_offset(1), 8);
        assert_eq!(schema.row_field_offset(2), 16);
        assert_eq!(schema.row_size(), 24);
    }

    #[test]
    fn columnar_layout_places_each_field_in_its_own_run() {
        let schema = sample_schema(Layout::Columnar);
        assert_eq!(schema.columnar_field_offset(0, 100), 0);
        assert_eq!(schema.columnar_field_offset(1, 100), 800);
        assert_eq!(schema.columnar_field_offset(2, 100), 1600);
    }

    #[test]
    fn capacity_respects_buffer_size() {
        let schema = sample_schema(Layout::Row);
        assert_eq!(schema.capacity_for_buffer_size(24 * 10), 10);
        assert_eq!(schema.capacity_for_buffer_size(24 * 10 + 5), 10);
    }
}
