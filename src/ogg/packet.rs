//! Reassembly of packets from page segments.

use std::collections::VecDeque;

use super::page::Page;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Granule position of the page this packet completed on, set only on
    /// the last packet finishing on that page.
    pub granule_position: Option<i64>,
    /// Set on the last packet of an end-of-stream page.
    pub eos: bool,
}

/// Joins lacing segments into packets, carrying a packet that spans pages.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    partial: Vec<u8>,
    in_packet: bool,
    ready: VecDeque<Packet>,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one page and return how many packets it completed.
    ///
    /// A continued page with no packet in progress has its leading
    /// continuation dropped. An unfinished packet followed by a page that
    /// does not continue it is discarded.
    pub fn push_page(&mut self, page: &Page<'_>) -> usize {
        let header = &page.header;
        let mut skip_continuation = header.is_continued() && !self.in_packet;
        if !header.is_continued() && self.in_packet {
            log::warn!(
                "discarding {} bytes of an unterminated packet before page {}",
                self.partial.len(),
                header.sequence
            );
            self.discard_partial();
        }

        let mut completed = 0;
        let mut offset = 0;
        for &lace in &header.lacing {
            let lace = lace as usize;
            let segment = &page.body[offset..offset + lace];
            offset += lace;

            if skip_continuation {
                if lace < 255 {
                    skip_continuation = false;
                }
                continue;
            }

            self.partial.extend_from_slice(segment);
            self.in_packet = true;
            if lace < 255 {
                self.ready.push_back(Packet {
                    data: std::mem::take(&mut self.partial),
                    granule_position: None,
                    eos: false,
                });
                self.in_packet = false;
                completed += 1;
            }
        }

        if completed > 0 {
            if let Some(last) = self.ready.back_mut() {
                last.granule_position =
                    (header.granule_position != -1).then_some(header.granule_position);
                last.eos = header.is_eos();
            }
        }
        completed
    }

    pub fn pop(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    /// Whether no complete packet is queued.
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Whether a packet is waiting for continuation on a later page.
    pub fn has_partial(&self) -> bool {
        self.in_packet
    }

    pub fn discard_partial(&mut self) {
        self.partial.clear();
        self.in_packet = false;
    }
}
