use lodestone_common::{BlockPosition, Result};
use lodestone_protocol::chunk_data::{BlockEntity, ChunkColumn, ChunkDataPacket, AIR};
use lodestone_protocol::play::{BlockEntityDataPacket, MultiBlockChangePacket};
use lodestone_nbt::Tag;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Columns the server has sent, keyed by chunk coordinates.
#[derive(Debug, Default)]
pub struct World {
    columns: HashMap<(i32, i32), ChunkColumn>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(&self, chunk_x: i32, chunk_z: i32) -> Option<&ChunkColumn> {
        self.columns.get(&(chunk_x, chunk_z))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// A full chunk replaces the column; a partial one overlays its sections.
    pub fn load_chunk(&mut self, packet: ChunkDataPacket) {
        let key = (packet.chunk_x, packet.chunk_z);
        trace!(
            chunk_x = key.0,
            chunk_z = key.1,
            full = packet.full_chunk,
            mask = packet.primary_bit_mask,
            "chunk data"
        );

        match self.columns.get_mut(&key) {
            Some(column) if !packet.full_chunk => column.merge(packet.column),
            _ => {
                self.columns.insert(key, packet.column);
            }
        }
    }

    pub fn unload_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> bool {
        self.columns.remove(&(chunk_x, chunk_z)).is_some()
    }

    /// Block state at `position`. Unloaded columns read as air.
    pub fn get_block(&self, position: BlockPosition) -> u32 {
        let (chunk_x, chunk_z) = position.chunk();
        self.column(chunk_x, chunk_z)
            .map_or(AIR, |column| column.get_block(position.x, position.y, position.z))
    }

    /// Changes one block. Returns `false` when its column is not loaded.
    pub fn set_block(&mut self, position: BlockPosition, block_state: u32) -> Result<bool> {
        let Some(column) = self.columns.get_mut(&position.chunk()) else {
            debug!(%position, "block change in unloaded column");
            return Ok(false);
        };
        column.set_block(position.x, position.y, position.z, block_state)?;
        Ok(true)
    }

    /// Applies every record; the first failing record stops the batch.
    pub fn apply_multi_block_change(&mut self, packet: &MultiBlockChangePacket) -> Result<()> {
        for record in &packet.records {
            self.set_block(record.position, record.block_state as u32)?;
        }
        Ok(())
    }

    /// An empty payload removes the block entity, anything else replaces it.
    pub fn apply_block_entity_data(&mut self, packet: BlockEntityDataPacket) {
        let Some(column) = self.columns.get_mut(&packet.position.chunk()) else {
            return;
        };

        let is_empty = match &packet.nbt {
            Tag::End => true,
            Tag::Compound(entries) => entries.is_empty(),
            _ => false,
        };
        if is_empty {
            column.remove_block_entity(&packet.position);
            return;
        }

        let id = packet
            .nbt
            .get("id")
            .and_then(Tag::as_str)
            .unwrap_or_default()
            .to_owned();
        column.insert_block_entity(BlockEntity {
            id,
            position: packet.position,
            nbt: packet.nbt,
        });
    }

    pub fn block_entity(&self, position: BlockPosition) -> Option<&BlockEntity> {
        let (chunk_x, chunk_z) = position.chunk();
        self.column(chunk_x, chunk_z)?.block_entity(&position)
    }
}
