// Scan / Emit memory providers (spec §2, §3 "Record"): schema-driven
// read/write of typed fields into/from a `TupleBuffer`'s raw bytes. A
// `Record` is never materialized as an independent heap object in steady
// state; a provider reads or writes one field of one tuple slot directly
// against the buffer.

use nes_base::{Error, Result};
use nes_common::{DataType, Layout, Schema};
use nes_memory::{TupleBuffer, VariableSizedAccess};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    VarSized(VariableSizedAccess),
}

impl FieldValue {
    fn type_matches(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (FieldValue::Bool(_), DataType::Bool)
                | (FieldValue::I32(_), DataType::I32)
                | (FieldValue::U32(_), DataType::U32)
                | (FieldValue::I64(_), DataType::I64)
                | (FieldValue::U64(_), DataType::U64)
                | (FieldValue::F64(_), DataType::F64)
                | (FieldValue::VarSized(_), DataType::VarSized)
        )
    }
}

fn field_byte_offset(schema: &Schema, field: usize, tuple_index: usize, capacity: usize) -> usize {
    match schema.layout {
        Layout::Row => schema.row_size() * tuple_index + schema.row_field_offset(field),
        Layout::Columnar => schema.columnar_field_offset(field, capacity) + schema.fields[field].data_type.size() * tuple_index,
    }
}

/// Writes records into a `TupleBuffer` at the next free tuple slot,
/// advancing the buffer's tuple count as it goes (spec §2 "Emit memory
/// providers").
pub struct EmitMemoryProvider<'a> {
    schema: &'a Schema,
    capacity: usize,
}

impl<'a> EmitMemoryProvider<'a> {
    pub fn new(schema: &'a Schema, buffer_size: usize) -> Self {
        EmitMemoryProvider { schema, capacity: schema.capacity_for_buffer_size(buffer_size) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends one record at the tuple index given by the buffer's current
    /// `num_tuples`, then increments it. Fails if the buffer is already at
    /// capacity (spec §3 invariant: "tuple count ≤ bufferSize / recordSize").
    pub fn append(&self, buffer: &mut TupleBuffer, fields: &[FieldValue]) -> Result<()> {
        if fields.len() != self.schema.fields.len() {
            return Err(Error::invariant_violation(format!(
                "record has {} fields, schema has {}",
                fields.len(),
                self.schema.fields.len()
            )));
        }
        let tuple_index = buffer.metadata().num_tuples as usize;
        if tuple_index >= self.capacity {
            return Err(Error::invariant_violation(format!(
                "buffer at capacity {} writing tuple {tuple_index}",
                self.capacity
            )));
        }
        for (i, value) in fields.iter().enumerate() {
            self.write_field(buffer, tuple_index, i, *value)?;
        }
        buffer.set_num_tuples((tuple_index + 1) as u64)?;
        Ok(())
    }

    fn write_field(&self, buffer: &mut TupleBuffer, tuple_index: usize, field: usize, value: FieldValue) -> Result<()> {
        let data_type = self.schema.fields[field].data_type;
        if !value.type_matches(data_type) {
            return Err(Error::invariant_violation(format!("field {field} type mismatch writing {value:?}")));
        }
        let offset = field_byte_offset(self.schema, field, tuple_index, self.capacity);
        let size = data_type.size();
        let slice = buffer
            .as_mut_slice()
            .ok_or_else(|| Error::invariant_violation("emit into a shared buffer"))?;
        let dest = slice
            .get_mut(offset..offset + size)
            .ok_or_else(|| Error::invariant_violation("field write out of bounds"))?;
        match value {
            FieldValue::Bool(v) => dest[0] = v as u8,
            FieldValue::I32(v) => dest.copy_from_slice(&v.to_le_bytes()),
            FieldValue::U32(v) => dest.copy_from_slice(&v.to_le_bytes()),
            FieldValue::I64(v) => dest.copy_from_slice(&v.to_le_bytes()),
            FieldValue::U64(v) => dest.copy_from_slice(&v.to_le_bytes()),
            FieldValue::F64(v) => dest.copy_from_slice(&v.to_le_bytes()),
            FieldValue::VarSized(v) => dest.copy_from_slice(&v.to_le_bytes()),
        }
        Ok(())
    }
}

/// Reads fields back out of a `TupleBuffer` written by an
/// `EmitMemoryProvider` against the same schema.
pub struct ScanMemoryProvider<'a> {
    schema: &'a Schema,
    capacity: usize,
}

impl<'a> ScanMemoryProvider<'a> {
    pub fn new(schema: &'a Schema, buffer_size: usize) -> Self {
        ScanMemoryProvider { schema, capacity: schema.capacity_for_buffer_size(buffer_size) }
    }

    pub fn num_tuples(&self, buffer: &TupleBuffer) -> usize {
        buffer.metadata().num_tuples as usize
    }

    pub fn read_field(&self, buffer: &TupleBuffer, tuple_index: usize, field: usize) -> Result<FieldValue> {
        let data_type = self.schema.fields[field].data_type;
        let offset = field_byte_offset(self.schema, field, tuple_index, self.capacity);
        let size = data_type.size();
        let src = buffer
            .as_slice()
            .get(offset..offset + size)
            .ok_or_else(|| Error::invariant_violation("field read out of bounds"))?;
        Ok(match data_type {
            DataType::Bool => FieldValue::Bool(src[0] != 0),
            DataType::I32 => FieldValue::I32(i32::from_le_bytes(src.try_into().unwrap())),
            DataType::U32 => FieldValue::U32(u32::from_le_bytes(src.try_into().unwrap())),
            DataType::I64 => FieldValue::I64(i64::from_le_bytes(src.try_into().unwrap())),
            DataType::U64 => FieldValue::U64(u64::from_le_bytes(src.try_into().unwrap())),
            DataType::F64 => FieldValue::F64(f64::from_le_bytes(src.try_into().unwrap())),
            DataType::VarSized => FieldValue::VarSized(VariableSizedAccess::from_le_bytes(src.try_into().unwrap())),
        })
    }

    pub fn read_tuple(&self, buffer: &TupleBuffer, tuple_index: usize) -> Result<Vec<FieldValue>> {
        (0..self.schema.fields.len()).map(|field| self.read_field(buffer, tuple_index, field)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_common::Field;
    use nes_memory::BufferManager;
    use nes_memory::BufferManagerConfig;

    fn schema() -> Schema {
        Schema::new(Layout::Row, vec![Field::new("ts", DataType::U64), Field::new("k", DataType::I64), Field::new("v", DataType::F64)])
    }

    #[test]
    fn round_trips_fixed_size_fields_through_row_layout() {
        let schema = schema();
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 1, buffer_size: 4096, local_pool_capacity: 1 });
        let mut buf = mgr.get_buffer_blocking();
        let emit = EmitMemoryProvider::new(&schema, buf.size());
        emit.append(&mut buf, &[FieldValue::U64(7), FieldValue::I64(-3), FieldValue::F64(2.5)]).unwrap();
        emit.append(&mut buf, &[FieldValue::U64(8), FieldValue::I64(4), FieldValue::F64(-1.5)]).unwrap();

        let scan = ScanMemoryProvider::new(&schema, buf.size());
        assert_eq!(scan.num_tuples(&buf), 2);
        assert_eq!(scan.read_tuple(&buf, 0).unwrap(), vec![FieldValue::U64(7), FieldValue::I64(-3), FieldValue::F64(2.5)]);
        assert_eq!(scan.read_tuple(&buf, 1).unwrap(), vec![FieldValue::U64(8), FieldValue::I64(4), FieldValue::F64(-1.5)]);
    }

    #[test]
    fn columnar_layout_round_trips_too() {
        let schema = Schema::new(Layout::Columnar, schema().fields);
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 1, buffer_size: 4096, local_pool_capacity: 1 });
        let mut buf = mgr.get_buffer_blocking();
        let emit = EmitMemoryProvider::new(&schema, buf.size());
        emit.append(&mut buf, &[FieldValue::U64(1), FieldValue::I64(2), FieldValue::F64(3.0)]).unwrap();
        let scan = ScanMemoryProvider::new(&schema, buf.size());
        assert_eq!(scan.read_tuple(&buf, 0).unwrap(), vec![FieldValue::U64(1), FieldValue::I64(2), FieldValue::F64(3.0)]);
    }

    #[test]
    fn append_past_capacity_fails_loud() {
        let schema = Schema::new(Layout::Row, vec![Field::new("v", DataType::U64)]);
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 1, buffer_size: 8, local_pool_capacity: 1 });
        let mut buf = mgr.get_buffer_blocking();
        let emit = EmitMemoryProvider::new(&schema, buf.size());
        assert_eq!(emit.capacity(), 1);
        emit.append(&mut buf, &[FieldValue::U64(1)]).unwrap();
        assert!(emit.append(&mut buf, &[FieldValue::U64(2)]).is_err());
    }

    #[test]
    fn field_type_mismatch_is_rejected() {
        let schema = schema();
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 1, buffer_size: 4096, local_pool_capacity: 1 });
        let mut buf = mgr.get_buffer_blocking();
        let emit = EmitMemoryProvider::new(&schema, buf.size());
        assert!(emit.append(&mut buf, &[FieldValue::I64(1), FieldValue::I64(2), FieldValue::F64(3.0)]).is_err());
    }
}
