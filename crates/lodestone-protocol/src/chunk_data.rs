use crate::packet::{versioned_id, Clientbound, DecodeContext, Packet, PacketBuffer};
use lodestone_common::{BlockPosition, LodestoneError, ProtocolState, ProtocolVersion, Result};
use lodestone_nbt::Tag;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Block state id of air.
pub const AIR: u32 = 0;
pub const SECTIONS_PER_COLUMN: usize = 16;
pub const SECTION_VOLUME: usize = 16 * 16 * 16;
pub const MIN_BITS_PER_BLOCK: u8 = 4;
/// Sections with more bits than this store global ids directly.
pub const MAX_PALETTE_BITS: u8 = 8;
const MAX_BITS_PER_BLOCK: u8 = 32;
/// Bytes of one nibble light array.
const LIGHT_ARRAY_LEN: usize = SECTION_VOLUME / 2;

/// Position-independent facts about a column needed to decode its sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkColumnMeta {
    pub x: i32,
    pub z: i32,
    pub section_mask: u16,
    pub full: bool,
    pub skylight: bool,
}

/// Number of longs in the straddling layout.
fn straddled_len(bits_per_block: u8) -> usize {
    (SECTION_VOLUME * bits_per_block as usize).div_ceil(64)
}

/// Reads entry `index` from a straddling bitstream. Callers guarantee the array is long enough.
fn read_entry(data: &[u64], index: usize, bits: usize) -> u64 {
    let bit_index = index * bits;
    let start_long = bit_index / 64;
    let end_long = ((index + 1) * bits - 1) / 64;
    let start_offset = bit_index % 64;
    let mask = (1u64 << bits) - 1;

    if start_long == end_long {
        (data[start_long] >> start_offset) & mask
    } else {
        let end_offset = 64 - start_offset;
        ((data[start_long] >> start_offset) | (data[end_long] << end_offset)) & mask
    }
}

fn write_entry(data: &mut [u64], index: usize, bits: usize, value: u64) {
    let bit_index = index * bits;
    let start_long = bit_index / 64;
    let end_long = ((index + 1) * bits - 1) / 64;
    let start_offset = bit_index % 64;
    let mask = (1u64 << bits) - 1;
    let value = value & mask;

    data[start_long] = (data[start_long] & !(mask << start_offset)) | (value << start_offset);

    if start_long != end_long {
        let end_offset = 64 - start_offset;
        data[end_long] = (data[end_long] & !(mask >> end_offset)) | (value >> end_offset);
    }
}

/// Converts the 1.16+ layout, where entries never cross a long boundary, into the straddling
/// layout used in memory.
fn repack_padded(data: &[u64], bits_per_block: u8) -> Result<Vec<u64>> {
    let bits = bits_per_block as usize;
    let per_long = 64 / bits;
    let needed = SECTION_VOLUME.div_ceil(per_long);
    if data.len() < needed {
        return Err(LodestoneError::decode(format!(
            "padded data array has {} longs, {needed} needed at {bits} bits",
            data.len()
        )));
    }

    let mask = (1u64 << bits) - 1;
    let mut repacked = vec![0u64; straddled_len(bits_per_block)];
    for index in 0..SECTION_VOLUME {
        let value = (data[index / per_long] >> (bits * (index % per_long))) & mask;
        write_entry(&mut repacked, index, bits, value);
    }
    Ok(repacked)
}

fn section_index(x: usize, y: usize, z: usize) -> usize {
    y * 16 * 16 + z * 16 + x
}

/// A 16x16x16 cube of block states.
///
/// `data` is a dense bitstream of `bits_per_block` wide entries indexed by `y*256 + z*16 + x`,
/// entries may straddle two longs. Below 9 bits an entry is an index into `palette`, otherwise
/// it is the global block state id. A default section holds no storage and reads as air.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSection {
    bits_per_block: u8,
    palette: Vec<u32>,
    data: Vec<u64>,
}

impl ChunkSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a section from straddling storage, validating the array length.
    pub fn from_parts(bits_per_block: u8, palette: Vec<u32>, data: Vec<u64>) -> Result<Self> {
        let bits_per_block = bits_per_block.max(MIN_BITS_PER_BLOCK);
        if bits_per_block > MAX_BITS_PER_BLOCK {
            return Err(LodestoneError::decode(format!(
                "{bits_per_block} bits per block"
            )));
        }
        let needed = straddled_len(bits_per_block);
        if data.len() < needed {
            return Err(LodestoneError::decode(format!(
                "data array has {} longs, {needed} needed at {bits_per_block} bits",
                data.len()
            )));
        }

        Ok(Self {
            bits_per_block,
            palette: if bits_per_block <= MAX_PALETTE_BITS {
                palette
            } else {
                Vec::new()
            },
            data,
        })
    }

    /// Reads one section from chunk data.
    pub fn load(
        buffer: &mut PacketBuffer,
        meta: &ChunkColumnMeta,
        section_y: usize,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if version.has_section_block_count() {
            let _block_count = buffer.read_i16()?;
        }

        let bits_per_block = buffer.read_u8()?.max(MIN_BITS_PER_BLOCK);
        if bits_per_block > MAX_BITS_PER_BLOCK {
            return Err(LodestoneError::decode(format!(
                "{bits_per_block} bits per block in section {section_y}"
            )));
        }

        let mut palette = Vec::new();
        if bits_per_block <= MAX_PALETTE_BITS {
            let palette_len = buffer.read_length()?;
            palette.reserve(palette_len.min(1 << MAX_PALETTE_BITS));
            for _ in 0..palette_len {
                palette.push(buffer.read_varint()? as u32);
            }
        }

        let data_len = buffer.read_length()?;
        let byte_len = data_len
            .checked_mul(8)
            .ok_or_else(|| LodestoneError::decode("data array length overflows"))?;
        let mut data: Vec<u64> = buffer
            .take(byte_len)?
            .chunks_exact(8)
            .map(|long| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(long);
                u64::from_be_bytes(bytes)
            })
            .collect();

        if version.has_padded_long_arrays() && 64 % bits_per_block != 0 {
            data = repack_padded(&data, bits_per_block)?;
        }

        if version.has_section_light() {
            buffer.take(LIGHT_ARRAY_LEN)?;
            if meta.skylight {
                buffer.take(LIGHT_ARRAY_LEN)?;
            }
        }

        trace!(
            x = meta.x,
            z = meta.z,
            section_y,
            bits_per_block,
            palette_len = palette.len(),
            "loaded chunk section"
        );
        Self::from_parts(bits_per_block, palette, data)
    }

    pub fn bits_per_block(&self) -> u8 {
        self.bits_per_block
    }

    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// Storage in the straddling layout.
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn uses_palette(&self) -> bool {
        self.bits_per_block <= MAX_PALETTE_BITS
    }

    /// Block state at section-relative coordinates. Anything outside 0..16 is air.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> u32 {
        if !(0..16).contains(&x) || !(0..16).contains(&y) || !(0..16).contains(&z) {
            return AIR;
        }
        if self.data.is_empty() {
            return AIR;
        }

        let index = section_index(x as usize, y as usize, z as usize);
        let value = read_entry(&self.data, index, self.bits_per_block as usize);

        if self.uses_palette() {
            // A palette index the server never defined reads as air
            self.palette.get(value as usize).copied().unwrap_or(AIR)
        } else {
            value as u32
        }
    }

    /// Sets a block state at section-relative coordinates.
    ///
    /// Bits per block never grow: a new palette entry that does not fit, or a direct id wider
    /// than the storage, fails with `PaletteFull` and leaves the section untouched.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block_state: u32) -> Result<()> {
        if !(0..16).contains(&x) || !(0..16).contains(&y) || !(0..16).contains(&z) {
            return Err(LodestoneError::decode(format!(
                "({x}, {y}, {z}) is outside the section"
            )));
        }

        if self.data.is_empty() {
            self.bits_per_block = MIN_BITS_PER_BLOCK;
            self.palette = vec![AIR];
            self.data = vec![0; straddled_len(MIN_BITS_PER_BLOCK)];
        }

        let bits = self.bits_per_block as usize;
        let value = if self.uses_palette() {
            match self.palette.iter().position(|&id| id == block_state) {
                Some(index) => index as u64,
                None if self.palette.len() < 1 << bits => {
                    self.palette.push(block_state);
                    (self.palette.len() - 1) as u64
                }
                None => {
                    return Err(LodestoneError::PaletteFull {
                        bits_per_block: self.bits_per_block,
                    })
                }
            }
        } else {
            if bits < 32 && u64::from(block_state) >> bits != 0 {
                return Err(LodestoneError::PaletteFull {
                    bits_per_block: self.bits_per_block,
                });
            }
            u64::from(block_state)
        };

        let index = section_index(x as usize, y as usize, z as usize);
        write_entry(&mut self.data, index, bits, value);
        Ok(())
    }
}

/// A block entity stored in a column, keyed by its world position.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntity {
    pub id: String,
    pub position: BlockPosition,
    pub nbt: Tag,
}

impl BlockEntity {
    /// Reads `id` and `x`/`y`/`z` from a block entity compound.
    pub fn from_nbt(nbt: Tag) -> Option<Self> {
        let position = BlockPosition::new(
            nbt.get("x")?.as_i32()?,
            nbt.get("y")?.as_i32()?,
            nbt.get("z")?.as_i32()?,
        );
        let id = nbt
            .get("id")
            .and_then(Tag::as_str)
            .unwrap_or_default()
            .to_owned();
        Some(Self { id, position, nbt })
    }
}

/// Sixteen stacked sections plus the block entities inside them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkColumn {
    meta: ChunkColumnMeta,
    sections: [Option<Box<ChunkSection>>; SECTIONS_PER_COLUMN],
    block_entities: HashMap<BlockPosition, BlockEntity>,
}

impl ChunkColumn {
    pub fn new(meta: ChunkColumnMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    /// Reads every section flagged in `meta.section_mask`; unflagged slots stay empty.
    pub fn decode(
        buffer: &mut PacketBuffer,
        meta: ChunkColumnMeta,
        version: ProtocolVersion,
    ) -> Result<Self> {
        let mut column = Self::new(meta);
        for (section_y, slot) in column.sections.iter_mut().enumerate() {
            if meta.section_mask & (1 << section_y) != 0 {
                *slot = Some(Box::new(ChunkSection::load(
                    buffer, &meta, section_y, version,
                )?));
            }
        }
        Ok(column)
    }

    pub fn meta(&self) -> &ChunkColumnMeta {
        &self.meta
    }

    pub fn x(&self) -> i32 {
        self.meta.x
    }

    pub fn z(&self) -> i32 {
        self.meta.z
    }

    pub fn section_mask(&self) -> u16 {
        self.meta.section_mask
    }

    pub fn section(&self, section_y: usize) -> Option<&ChunkSection> {
        self.sections.get(section_y)?.as_deref()
    }

    /// Block state at a world position; x and z are reduced to this column.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> u32 {
        let section_y = y.div_euclid(16);
        if !(0..SECTIONS_PER_COLUMN as i32).contains(&section_y) {
            return AIR;
        }
        match &self.sections[section_y as usize] {
            Some(section) => section.get_block(x & 15, y.rem_euclid(16), z & 15),
            None => AIR,
        }
    }

    /// Sets a block state at a world position, creating the section if needed.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block_state: u32) -> Result<()> {
        let section_y = y.div_euclid(16);
        if !(0..SECTIONS_PER_COLUMN as i32).contains(&section_y) {
            return Err(LodestoneError::decode(format!(
                "y = {y} is outside the column"
            )));
        }

        let slot = &mut self.sections[section_y as usize];
        if slot.is_none() && block_state == AIR {
            return Ok(());
        }
        slot.get_or_insert_with(Box::default)
            .set_block(x & 15, y.rem_euclid(16), z & 15, block_state)?;
        self.meta.section_mask |= 1 << section_y;
        Ok(())
    }

    /// Overlays the sections and block entities of a partial update.
    pub fn merge(&mut self, update: ChunkColumn) {
        let ChunkColumn {
            meta,
            sections,
            block_entities,
        } = update;

        for (section_y, section) in sections.into_iter().enumerate() {
            if meta.section_mask & (1 << section_y) != 0 {
                self.sections[section_y] = section;
            }
        }
        self.meta.section_mask |= meta.section_mask;
        self.block_entities.extend(block_entities);
    }

    pub fn block_entity(&self, position: &BlockPosition) -> Option<&BlockEntity> {
        self.block_entities.get(position)
    }

    pub fn block_entities(&self) -> impl Iterator<Item = &BlockEntity> {
        self.block_entities.values()
    }

    pub fn insert_block_entity(&mut self, entity: BlockEntity) -> Option<BlockEntity> {
        self.block_entities.insert(entity.position, entity)
    }

    pub fn remove_block_entity(&mut self, position: &BlockPosition) -> Option<BlockEntity> {
        self.block_entities.remove(position)
    }
}

/// Chunk Data. `column` already holds the decoded sections and block entities.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDataPacket {
    pub chunk_x: i32,
    pub chunk_z: i32,
    /// A full chunk replaces the column, otherwise only the masked sections change.
    pub full_chunk: bool,
    pub ignore_old_data: bool,
    pub primary_bit_mask: u16,
    /// `Tag::End` before 1.14.
    pub heightmaps: Tag,
    /// Only present for full chunks.
    pub biomes: Option<Vec<i32>>,
    pub column: ChunkColumn,
}

impl Packet for ChunkDataPacket {
    fn packet_id() -> i32 {
        0x20
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x20, 0x22, 0x21, 0x22, 0x21, 0x20])
    }
}

fn read_biomes(buffer: &mut PacketBuffer, version: ProtocolVersion) -> Result<Vec<i32>> {
    if version.has_varint_biomes() {
        let count = buffer.read_length()?;
        let mut biomes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            biomes.push(buffer.read_varint()?);
        }
        return Ok(biomes);
    }

    let count = if version.has_biomes_before_data() {
        1024
    } else {
        256
    };
    (0..count).map(|_| buffer.read_i32()).collect()
}

impl Clientbound for ChunkDataPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        let version = ctx.version;
        let chunk_x = buffer.read_i32()?;
        let chunk_z = buffer.read_i32()?;
        let full_chunk = buffer.read_bool()?;
        let ignore_old_data = if version.has_ignore_old_data() {
            buffer.read_bool()?
        } else {
            false
        };

        let raw_mask = buffer.read_varint()?;
        let primary_bit_mask = u16::try_from(raw_mask)
            .map_err(|_| LodestoneError::decode(format!("section mask {raw_mask:#x}")))?;

        let heightmaps = if version.has_heightmaps() {
            buffer.read_nbt()?
        } else {
            Tag::End
        };

        let mut biomes = None;
        if full_chunk && version.has_biomes_before_data() {
            biomes = Some(read_biomes(buffer, version)?);
        }

        let size = buffer.read_length()?;
        let mut data = PacketBuffer::from_bytes(buffer.take(size)?);
        let meta = ChunkColumnMeta {
            x: chunk_x,
            z: chunk_z,
            section_mask: primary_bit_mask,
            full: full_chunk,
            skylight: ctx.skylight,
        };
        let mut column = ChunkColumn::decode(&mut data, meta, version)?;

        if full_chunk && !version.has_biomes_before_data() {
            biomes = Some(read_biomes(&mut data, version)?);
        }

        let entity_count = buffer.read_length()?;
        for _ in 0..entity_count {
            let nbt = buffer.read_nbt()?;
            match BlockEntity::from_nbt(nbt) {
                Some(entity) => {
                    column.insert_block_entity(entity);
                }
                None => debug!(chunk_x, chunk_z, "block entity without coordinates skipped"),
            }
        }

        Ok(ChunkDataPacket {
            chunk_x,
            chunk_z,
            full_chunk,
            ignore_old_data,
            primary_bit_mask,
            heightmaps,
            biomes,
            column,
        })
    }
}
