//! Core-Local Interrupt Controller
//!
//! Per-hart CLIC state: the packed per-interrupt records, the
//! pending-and-enabled summary bitmap, and the level/privilege
//! selection algorithm. The shared cluster state (cliccfg, clicinfo,
//! memory-mapped page dispatch) lives in the cluster module; each
//! hart keeps a mirror of the cluster cliccfg so that selection is a
//! hart-local operation.
//!
//! Register layouts follow the draft CLIC spec: each interrupt i owns
//! a 4-byte word {clicintip, clicintie, clicintattr, clicintctl}, and
//! the top CLICINTCTLBITS of clicintctl are writable with the
//! remaining low bits reading as 1.

use log::debug;

use crate::config::{ClicConfig, HartConfig};
use crate::csr::{Cliccfg, ClicIntAttr};
use crate::mode::PrivMode;

/// Per-interrupt state: the four byte-sized fields of one CLIC
/// register word
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ClicIntState {
    pub pending: bool,
    pub enable: bool,
    pub attr: ClicIntAttr,
    pub ctl: u8,
}

impl ClicIntState {
    /// Pack into the memory-mapped word layout: ip in byte 0, ie in
    /// byte 1, attr in byte 2, ctl in byte 3
    pub fn pack(&self) -> u32 {
        u32::from(self.pending)
            | u32::from(self.enable) << 8
            | u32::from(self.attr.as_raw()) << 16
            | u32::from(self.ctl) << 24
    }

    pub fn unpack(word: u32) -> Self {
        Self {
            pending: word & 1 != 0,
            enable: word >> 8 & 1 != 0,
            attr: ClicIntAttr::from_raw((word >> 16) as u8),
            ctl: (word >> 24) as u8,
        }
    }
}

/// The currently selected CLIC interrupt: the winner of the rank scan
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClicSelection {
    pub id: u32,
    pub target: PrivMode,
    pub level: u8,
    pub shv: bool,
}

/// Clamp a raw cliccfg write: WPRI bits read zero, nmbits is bounded
/// by CLICCFGMBITS, nlbits by 8, and nvbits is read-only (it reports
/// CLICSELHVEC).
pub fn clamp_cliccfg(value: u8, config: &ClicConfig) -> Cliccfg {
    let mut cfg = Cliccfg::from_raw(value & 0b0111_1111);
    if cfg.nmbits() > config.cfg_mbits {
        cfg.set_nmbits(config.cfg_mbits);
    }
    if cfg.nlbits() > 8 {
        cfg.set_nlbits(8);
    }
    cfg.set_nvbits(config.sel_hvec);
    cfg
}

/// Per-hart CLIC state
#[derive(Debug, Clone)]
pub struct ClicHartState {
    config: ClicConfig,
    /// S-mode exists on this hart
    s_implemented: bool,
    /// U-mode interrupts exist on this hart (U plus the N extension)
    u_implemented: bool,
    /// Mirror of the cluster-level cliccfg
    pub cfg: Cliccfg,
    int_state: Vec<ClicIntState>,
    /// Summary bitmap: bit i set iff int_state[i].pending ∧ .enable
    ipe: Vec<u64>,
    /// Selection cache, refreshed after every state change
    pub sel: Option<ClicSelection>,
}

impl ClicHartState {
    pub fn new(config: &ClicConfig, hart_config: &HartConfig) -> Self {
        let count = config.num_interrupt as usize;
        let mut state = Self {
            config: *config,
            s_implemented: hart_config.extensions.has('S'),
            u_implemented: hart_config.extensions.has('U')
                && hart_config.extensions.has('N'),
            cfg: clamp_cliccfg(0, config),
            int_state: vec![ClicIntState::default(); count],
            ipe: vec![0; (count + 63) / 64],
            sel: None,
        };
        for record in state.int_state.iter_mut() {
            record.ctl = state.config.always_one_ctl_mask();
        }
        state
    }

    /// Hart reset: clear every interrupt record and the selection.
    /// The cliccfg mirror stays; that register belongs to the cluster
    /// block, not the hart.
    pub fn reset(&mut self) {
        let ctl = self.config.always_one_ctl_mask();
        for record in self.int_state.iter_mut() {
            *record = ClicIntState { ctl, ..ClicIntState::default() };
        }
        for word in self.ipe.iter_mut() {
            *word = 0;
        }
        self.sel = None;
    }

    pub fn interrupt_count(&self) -> u32 {
        self.config.num_interrupt
    }

    pub fn state(&self, id: u32) -> ClicIntState {
        self.int_state[id as usize]
    }

    /// Replace one packed record wholesale (save/restore path). The
    /// summary bitmap must be rebuilt afterwards.
    pub fn load_state(&mut self, id: u32, state: ClicIntState) {
        self.int_state[id as usize] = state;
    }

    /// Whether the id exists on this hart. Reserved standard ids and
    /// standard interrupts for unimplemented modes are invisible.
    pub fn id_implemented(&self, id: u32) -> bool {
        if id >= self.config.num_interrupt {
            false
        } else if id >= 16 {
            true
        } else {
            match id {
                3 | 7 | 11 | 12 => true,
                1 | 5 | 9 => self.s_implemented,
                0 | 4 | 8 => self.u_implemented,
                _ => false,
            }
        }
    }

    /// Interpret an attr.mode field under the current cliccfg.nmbits
    /// (the table in the CLIC draft spec). The reserved M/S/U
    /// encoding 10 reads as machine.
    pub fn effective_mode(&self, attr: ClicIntAttr) -> PrivMode {
        let nmbits = self.cfg.nmbits();
        let field = attr.mode();
        if nmbits == 0 || self.config.cfg_mbits == 0 {
            PrivMode::Machine
        } else if !self.s_implemented {
            match field >> 1 {
                0 if self.u_implemented => PrivMode::User,
                _ => PrivMode::Machine,
            }
        } else if nmbits == 1 {
            match field >> 1 {
                0 => PrivMode::Supervisor,
                _ => PrivMode::Machine,
            }
        } else {
            match field {
                0 => PrivMode::User,
                1 => PrivMode::Supervisor,
                _ => PrivMode::Machine,
            }
        }
    }

    /// Clamp a written attr.mode field: never above the containing
    /// page's mode, never an unimplemented mode, and never below M
    /// when CLICCFGMBITS is zero. Returns the stored encoding.
    fn clamp_attr_mode(&self, requested: u8, page_mode: PrivMode) -> u8 {
        if self.config.cfg_mbits == 0 {
            return PrivMode::Machine.encoding() as u8;
        }
        let mut mode = match requested {
            0 => PrivMode::User,
            1 => PrivMode::Supervisor,
            _ => PrivMode::Machine,
        };
        if mode > page_mode {
            mode = page_mode;
        }
        mode = match mode {
            PrivMode::Supervisor if !self.s_implemented => {
                if self.u_implemented {
                    PrivMode::User
                } else {
                    PrivMode::Machine
                }
            }
            PrivMode::User if !self.u_implemented => PrivMode::Machine,
            mode => mode,
        };
        if mode > page_mode {
            mode = page_mode;
        }
        mode.encoding() as u8
    }

    fn refresh_ipe_bit(&mut self, id: u32) {
        let record = self.int_state[id as usize];
        let word = (id / 64) as usize;
        let bit = 1u64 << (id % 64);
        if record.pending && record.enable {
            self.ipe[word] |= bit;
        } else {
            self.ipe[word] &= !bit;
        }
    }

    pub fn any_pending_enabled(&self) -> bool {
        self.ipe.iter().any(|word| *word != 0)
    }

    /// Rebuild the summary bitmap from scratch and re-run selection
    /// (restore path)
    pub fn rebuild(&mut self) {
        for id in 0..self.config.num_interrupt {
            self.refresh_ipe_bit(id);
        }
        self.reselect();
    }

    pub fn write_pending(&mut self, id: u32, value: bool) {
        self.int_state[id as usize].pending = value;
        self.refresh_ipe_bit(id);
        self.reselect();
    }

    pub fn write_enable(&mut self, id: u32, value: bool) {
        self.int_state[id as usize].enable = value;
        self.refresh_ipe_bit(id);
        self.reselect();
    }

    /// Write clicintattr. Reserved bits are WPRI and the mode field
    /// is clamped against the page being written through.
    pub fn write_attr(&mut self, id: u32, value: u8, page_mode: PrivMode) {
        let mut attr = ClicIntAttr::from_raw(value & 0b1100_0111);
        attr.set_mode(self.clamp_attr_mode(attr.mode(), page_mode));
        self.int_state[id as usize].attr = attr;
        self.reselect();
    }

    /// Write clicintctl. The low bits below CLICINTCTLBITS always
    /// read as 1.
    pub fn write_ctl(&mut self, id: u32, value: u8) {
        self.int_state[id as usize].ctl =
            value | self.config.always_one_ctl_mask();
        self.reselect();
    }

    /// Apply an input net change to interrupt id. The raw values are
    /// the previous and new latched line levels; attr.trig selects
    /// edge/level triggering and active-low inversion.
    pub fn input(&mut self, id: u32, previous_raw: bool, raw: bool) {
        let attr = self.int_state[id as usize].attr;
        let (previous, value) = if attr.active_low() {
            (!previous_raw, !raw)
        } else {
            (previous_raw, raw)
        };
        if attr.edge_triggered() {
            if value && !previous {
                self.int_state[id as usize].pending = true;
            }
        } else {
            self.int_state[id as usize].pending = value;
        }
        self.refresh_ipe_bit(id);
        self.reselect();
    }

    /// Acknowledge a delivered interrupt: an edge-triggered source
    /// deasserts; a level-triggered source stays pending and the
    /// selector is simply re-evaluated.
    pub fn acknowledge(&mut self, id: u32) {
        if self.int_state[id as usize].attr.edge_triggered() {
            self.int_state[id as usize].pending = false;
            self.refresh_ipe_bit(id);
        }
        self.reselect();
    }

    /// The interrupt level for a clicintctl value: the top nlbits are
    /// significant and the lower bits are filled with 1s
    fn level_for(&self, ctl: u8) -> u8 {
        let nlbits = u32::from(self.cfg.nlbits().min(8));
        ctl | (0xffu32 >> nlbits) as u8
    }

    /// Scan the summary bitmap and pick the winner: the maximum of
    /// (effective mode, clicintctl), ties going to the higher
    /// interrupt id.
    pub fn reselect(&mut self) {
        let mut best: Option<(u64, ClicSelection)> = None;
        for (index, word) in self.ipe.iter().enumerate() {
            let mut bits = *word;
            while bits != 0 {
                let id = 64 * index as u32 + bits.trailing_zeros();
                bits &= bits - 1;
                let record = self.int_state[id as usize];
                let target = self.effective_mode(record.attr);
                let rank = target.encoding() << 8 | u64::from(record.ctl);
                // >= so that the higher id wins a tied rank
                if best.map_or(true, |(top, _)| rank >= top) {
                    let selection = ClicSelection {
                        id,
                        target,
                        level: self.level_for(record.ctl),
                        shv: record.attr.shv() && self.cfg.nvbits(),
                    };
                    best = Some((rank, selection));
                }
            }
        }
        let selection = best.map(|(_, selection)| selection);
        if selection != self.sel {
            debug!("clic selection changed: {:?}", selection);
        }
        self.sel = selection;
    }

    /// Byte-granular read of an interrupt page. Returns 0 when the
    /// interrupt is invisible through this page.
    pub fn read_byte(&self, page_mode: PrivMode, word: u32, byte: u32) -> u8 {
        if !self.visible(word, page_mode) {
            return 0;
        }
        let record = self.int_state[word as usize];
        match byte {
            0 => u8::from(record.pending),
            1 => u8::from(record.enable),
            2 => record.attr.as_raw(),
            _ => record.ctl,
        }
    }

    /// Byte-granular write of an interrupt page. Silently dropped
    /// when the interrupt is invisible through this page.
    pub fn write_byte(
        &mut self,
        page_mode: PrivMode,
        word: u32,
        byte: u32,
        value: u8,
    ) {
        if !self.visible(word, page_mode) {
            return;
        }
        match byte {
            0 => self.write_pending(word, value & 1 != 0),
            1 => self.write_enable(word, value & 1 != 0),
            2 => self.write_attr(word, value, page_mode),
            _ => self.write_ctl(word, value),
        }
    }

    /// An interrupt is visible through a page when it exists and its
    /// current effective mode does not exceed the page's mode
    fn visible(&self, id: u32, page_mode: PrivMode) -> bool {
        self.id_implemented(id)
            && self.effective_mode(self.int_state[id as usize].attr)
                <= page_mode
    }
}

impl ClicConfig {
    /// The low clicintctl bits that are not backed by configuration
    /// flops and always read as 1
    pub fn always_one_ctl_mask(&self) -> u8 {
        (0xffu32 >> self.ctl_bits) as u8
    }
}
