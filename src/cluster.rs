//! Hart cluster
//!
//! The root object of the model: the leaf harts plus the state they
//! share, which is the CLIC control page (cliccfg and clicinfo) and
//! the memory-mapped CLIC register file.
//!
//! ## CLIC memory map
//!
//! The cluster exposes `1 + 3 * num_harts` 4 KiB pages at the
//! configured base address. Page 0 is the control page; the rest are
//! three sets of `num_harts` interrupt pages, in the order M, S, U:
//!
//! | Page | Contents |
//! |------|----------|
//! | 0 | cliccfg at offset 0, clicinfo (read-only) at offset 4 |
//! | 1 .. N | M-mode interrupt pages, one per hart |
//! | N+1 .. 2N | S-mode interrupt pages, one per hart |
//! | 2N+1 .. 3N | U-mode interrupt pages, one per hart |
//!
//! Within an interrupt page, the word index selects the interrupt and
//! the byte index selects one of {ip, ie, attr, ctl}. All accesses
//! are byte-granular; bytes an accessor is not allowed to see read as
//! zero and writes to them are dropped silently.

use log::debug;

use crate::clic::clamp_cliccfg;
use crate::config::{ClicConfig, ConfigError, HartConfig};
use crate::csr::{Cliccfg, Clicinfo};
use crate::hart::Hart;
use crate::host::Host;
use crate::mode::PrivMode;

pub const CLIC_PAGE_BYTES: u64 = 4096;

/// Cluster-level CLIC state
#[derive(Debug, Clone)]
struct ClusterClic {
    config: ClicConfig,
    cfg: Cliccfg,
    info: Clicinfo,
}

#[derive(Debug)]
pub struct Cluster {
    pub harts: Vec<Hart>,
    clic: Option<ClusterClic>,
}

impl Cluster {
    pub fn new(
        config: HartConfig,
        num_harts: u32,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if num_harts == 0 {
            return Err(ConfigError::NoHarts);
        }
        let harts = (0..num_harts).map(|id| Hart::new(id, config)).collect();
        let clic = config.clic.map(|clic_config| ClusterClic {
            config: clic_config,
            cfg: clamp_cliccfg(0, &clic_config),
            info: Clicinfo::new(&clic_config),
        });
        Ok(Self { harts, clic })
    }

    /// Register the CLIC register pages with the host memory system
    pub fn attach<H: Host>(&self, host: &mut H) {
        if let Some(clic) = &self.clic {
            host.install_mapped_range(
                clic.config.mclicbase,
                self.clic_size(),
            );
        }
    }

    /// Total size of the memory-mapped region
    pub fn clic_size(&self) -> u64 {
        (1 + 3 * self.harts.len() as u64) * CLIC_PAGE_BYTES
    }

    pub fn clic_base(&self) -> Option<u64> {
        self.clic.as_ref().map(|clic| clic.config.mclicbase)
    }

    pub fn cliccfg(&self) -> Option<Cliccfg> {
        self.clic.as_ref().map(|clic| clic.cfg)
    }

    /// Decode an interrupt-page number into its (mode, hart) target
    fn page_target(&self, page: u64) -> Option<(PrivMode, usize)> {
        let num_harts = self.harts.len() as u64;
        let index = page.checked_sub(1)?;
        if index >= 3 * num_harts {
            return None;
        }
        let mode = match index / num_harts {
            0 => PrivMode::Machine,
            1 => PrivMode::Supervisor,
            _ => PrivMode::User,
        };
        Some((mode, (index % num_harts) as usize))
    }

    /// Byte-granular read at an offset from the CLIC base
    pub fn clic_read(&self, offset: u64) -> u8 {
        let Some(clic) = &self.clic else { return 0 };
        let page = offset / CLIC_PAGE_BYTES;
        let index = offset % CLIC_PAGE_BYTES;
        if page == 0 {
            match index {
                0 => clic.cfg.as_raw(),
                4..=7 => (clic.info.as_raw() >> (8 * (index - 4))) as u8,
                _ => 0,
            }
        } else if let Some((mode, hart_index)) = self.page_target(page) {
            let word = (index / 4) as u32;
            let byte = (index % 4) as u32;
            self.harts[hart_index]
                .clic
                .as_ref()
                .map_or(0, |state| state.read_byte(mode, word, byte))
        } else {
            0
        }
    }

    /// Byte-granular write at an offset from the CLIC base
    pub fn clic_write<H: Host>(
        &mut self,
        host: &mut H,
        offset: u64,
        value: u8,
    ) {
        if self.clic.is_none() {
            return;
        }
        let page = offset / CLIC_PAGE_BYTES;
        let index = offset % CLIC_PAGE_BYTES;
        if page == 0 {
            // clicinfo is read-only and the rest of the control page
            // is reserved
            if index == 0 {
                self.write_cliccfg(host, value);
            }
        } else if let Some((mode, hart_index)) = self.page_target(page) {
            let word = (index / 4) as u32;
            let byte = (index % 4) as u32;
            let hart = &mut self.harts[hart_index];
            if let Some(state) = hart.clic.as_mut() {
                state.write_byte(mode, word, byte, value);
            }
            hart.refresh_interrupts(host);
        }
    }

    /// Install a saved cliccfg value without running selection; the
    /// restore path rebuilds every hart afterwards
    pub(crate) fn load_cliccfg(&mut self, raw: u8) {
        let new_cfg = match self.clic.as_ref() {
            Some(clic) => clamp_cliccfg(raw, &clic.config),
            None => return,
        };
        if let Some(clic) = self.clic.as_mut() {
            clic.cfg = new_cfg;
        }
        for hart in self.harts.iter_mut() {
            if let Some(state) = hart.clic.as_mut() {
                state.cfg = new_cfg;
            }
        }
    }

    /// Write cliccfg. The mode interpretation of every interrupt may
    /// have changed, so on any change every leaf hart re-runs its
    /// selection.
    fn write_cliccfg<H: Host>(&mut self, host: &mut H, value: u8) {
        let new_cfg = match self.clic.as_ref() {
            Some(clic) => clamp_cliccfg(value, &clic.config),
            None => return,
        };
        let changed =
            self.clic.as_ref().map_or(false, |clic| clic.cfg != new_cfg);
        if !changed {
            return;
        }
        debug!("cliccfg changed to 0x{:02x}", new_cfg.as_raw());
        if let Some(clic) = self.clic.as_mut() {
            clic.cfg = new_cfg;
        }
        for hart in self.harts.iter_mut() {
            if let Some(state) = hart.clic.as_mut() {
                state.cfg = new_cfg;
            }
            hart.refresh_interrupts(host);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::csr::TvecMode;
    use crate::host::SimpleHost;
    use crate::trap::{Interrupt, Trap};

    fn cluster() -> (Cluster, SimpleHost) {
        let cluster = Cluster::new(HartConfig::default(), 1).unwrap();
        (cluster, SimpleHost::new())
    }

    /// Offset of one {ip, ie, attr, ctl} byte in the M-mode page of
    /// hart 0 of a single-hart cluster
    fn m_page(id: u64, byte: u64) -> u64 {
        CLIC_PAGE_BYTES + 4 * id + byte
    }

    fn make_clic_active(cluster: &mut Cluster, host: &mut SimpleHost) {
        let hart = &mut cluster.harts[0];
        hart.csrs
            .xtvec_mut(PrivMode::Machine)
            .set_mode(TvecMode::Clic);
        hart.csrs.mstatus.set_mie(true);
        hart.refresh_interrupts(host);
    }

    #[test]
    fn check_control_page_layout() {
        let (mut cluster, mut host) = cluster();
        // nlbits = 4 -> raw 0b0000_1000, nvbits forced to 1 by
        // CLICSELHVEC
        cluster.clic_write(&mut host, 0, 0b0000_1000);
        assert_eq!(cluster.clic_read(0), 0b0000_1001);
        // clicinfo: num_interrupt 64, version 1 at bit 13,
        // CLICINTCTLBITS 4 at bit 21
        let info = u32::from(cluster.clic_read(4))
            | u32::from(cluster.clic_read(5)) << 8
            | u32::from(cluster.clic_read(6)) << 16
            | u32::from(cluster.clic_read(7)) << 24;
        assert_eq!(info, 64 | 1 << 13 | 4 << 21);
        // clicinfo is read-only
        cluster.clic_write(&mut host, 4, 0xff);
        assert_eq!(cluster.clic_read(4), 64);
        // Reserved control bytes read as zero
        assert_eq!(cluster.clic_read(8), 0);
    }

    #[test]
    fn check_ctl_write_read_back_with_forced_ones() {
        let (mut cluster, mut host) = cluster();
        cluster.clic_write(&mut host, m_page(42, 3), 0xa0);
        // CLICINTCTLBITS = 4: the low four bits read as 1
        assert_eq!(cluster.clic_read(m_page(42, 3)), 0xaf);
    }

    #[test]
    fn check_supervisor_page_cannot_see_machine_interrupt() {
        let (mut cluster, mut host) = cluster();
        // nmbits = 2 so the attr mode field decodes fully
        cluster.clic_write(&mut host, 0, 0b0100_0000);
        // Put interrupt 5 in M mode with a distinctive ctl
        cluster.clic_write(&mut host, m_page(5, 2), 0b1100_0000);
        cluster.clic_write(&mut host, m_page(5, 3), 0xf0);
        let s_page_offset =
            2 * CLIC_PAGE_BYTES + 4 * 5;
        assert_eq!(cluster.clic_read(s_page_offset + 3), 0);
        // A write through the S page is silently dropped
        cluster.clic_write(&mut host, s_page_offset + 1, 1);
        assert!(!cluster.harts[0].clic.as_ref().unwrap().state(5).enable);
        // The M page sees everything
        assert_eq!(cluster.clic_read(m_page(5, 3)), 0xff);
    }

    #[test]
    fn check_attr_mode_clamped_through_page() {
        let (mut cluster, mut host) = cluster();
        cluster.clic_write(&mut host, 0, 0b0100_0000);
        // Request M mode through the S page: clamped to S
        let s_page_offset = 2 * CLIC_PAGE_BYTES + 4 * 20;
        cluster.clic_write(&mut host, s_page_offset + 2, 0b1100_0000);
        let state = cluster.harts[0].clic.as_ref().unwrap().state(20);
        assert_eq!(
            cluster.harts[0]
                .clic
                .as_ref()
                .unwrap()
                .effective_mode(state.attr),
            PrivMode::Supervisor
        );
    }

    /// Selective hardware vectoring: the handler pointer is fetched
    /// from the vector table and mcause reports inhv only during the
    /// fetch
    #[test]
    fn check_clic_shv_delivery() {
        let (mut cluster, mut host) = cluster();
        // nlbits = 4 (nvbits reads back 1 from CLICSELHVEC)
        cluster.clic_write(&mut host, 0, 0b0000_1000);
        make_clic_active(&mut cluster, &mut host);
        cluster.harts[0].csrs.set_xtvt(PrivMode::Machine, 0x9000);
        // Handler pointer for interrupt 42, low bit set to prove the
        // mask
        host.write_word(0x9000 + 4 * 42, 0x5001);

        // Interrupt 42: shv, ctl 0xf0, enabled, pending
        cluster.clic_write(&mut host, m_page(42, 2), 0b0000_0001);
        cluster.clic_write(&mut host, m_page(42, 3), 0xf0);
        cluster.clic_write(&mut host, m_page(42, 1), 1);
        cluster.clic_write(&mut host, m_page(42, 0), 1);

        let selection = cluster.harts[0].pending_interrupt().unwrap();
        assert!(selection.is_clic);
        assert_eq!(selection.level, 0xff);
        let clic_sel =
            cluster.harts[0].clic.as_ref().unwrap().sel.unwrap();
        assert!(clic_sel.shv);

        host.set_pc(0x88);
        assert!(!cluster.harts[0].fetch(&mut host, 0x88, 4));

        let hart = &cluster.harts[0];
        assert_eq!(host.pc(), 0x5000);
        assert_eq!(hart.csrs.xepc(PrivMode::Machine), 0x88);
        let cause = hart.csrs.xcause(PrivMode::Machine);
        assert_eq!(cause.code(), 42);
        assert!(cause.interrupt(hart.config.xlen));
        assert!(!cause.inhv());
        assert_eq!(
            hart.csrs.mintstatus.xil(PrivMode::Machine),
            0xff
        );
        assert_eq!(
            hart.last_trap(),
            Some(Trap::Interrupt(Interrupt::Local(26)))
        );
        // The delivery consumed the selection: the running level now
        // masks it
        assert_eq!(cluster.harts[0].pending_interrupt(), None);
    }

    /// A faulting vector-table fetch abandons the outer delivery; the
    /// acknowledgement of an edge source has already happened
    #[test]
    fn check_clic_shv_nested_fault_abandons_delivery() {
        let (mut cluster, mut host) = cluster();
        cluster.clic_write(&mut host, 0, 0b0000_1000);
        make_clic_active(&mut cluster, &mut host);
        cluster.harts[0].csrs.set_xtvt(PrivMode::Machine, 0x9000);
        host.fail_reads(0x9000, 0x1000);

        // Edge-triggered shv interrupt 30
        cluster.clic_write(&mut host, m_page(30, 2), 0b0000_0011);
        cluster.clic_write(&mut host, m_page(30, 3), 0xf0);
        cluster.clic_write(&mut host, m_page(30, 1), 1);
        cluster.clic_write(&mut host, m_page(30, 0), 1);

        host.set_pc(0x88);
        assert!(!cluster.harts[0].fetch(&mut host, 0x88, 4));

        let hart = &cluster.harts[0];
        // No handler jump: the nested trap's pc will prevail
        assert_eq!(host.pc(), 0x88);
        // The CSR updates already happened, inhv is left standing
        assert!(hart.csrs.xcause(PrivMode::Machine).inhv());
        assert_eq!(hart.csrs.xcause(PrivMode::Machine).code(), 30);
        // The edge acknowledgement stands: pending is gone
        assert!(!hart.clic.as_ref().unwrap().state(30).pending);
        assert_eq!(hart.last_trap(), None);
    }

    /// The interrupt-level threshold gates delivery
    #[test]
    fn check_clic_threshold_gate() {
        let (mut cluster, mut host) = cluster();
        cluster.clic_write(&mut host, 0, 0b0000_1000);
        make_clic_active(&mut cluster, &mut host);
        cluster.harts[0]
            .csrs
            .set_xintthresh(PrivMode::Machine, 0xff);
        cluster.clic_write(&mut host, m_page(12, 3), 0xf0);
        cluster.clic_write(&mut host, m_page(12, 1), 1);
        cluster.clic_write(&mut host, m_page(12, 0), 1);
        // level 0xff is not strictly above the threshold
        assert_eq!(cluster.harts[0].pending_interrupt(), None);
        cluster.harts[0]
            .csrs
            .set_xintthresh(PrivMode::Machine, 0x80);
        cluster.harts[0].refresh_interrupts(&mut host);
        assert!(cluster.harts[0].pending_interrupt().is_some());
    }

    /// The running interrupt level gates delivery the same way
    #[test]
    fn check_clic_running_level_gate() {
        let (mut cluster, mut host) = cluster();
        cluster.clic_write(&mut host, 0, 0b0000_1000);
        make_clic_active(&mut cluster, &mut host);
        cluster.harts[0]
            .csrs
            .mintstatus
            .set_xil(PrivMode::Machine, 0xff);
        cluster.clic_write(&mut host, m_page(12, 3), 0xf0);
        cluster.clic_write(&mut host, m_page(12, 1), 1);
        cluster.clic_write(&mut host, m_page(12, 0), 1);
        assert_eq!(cluster.harts[0].pending_interrupt(), None);
    }

    /// A basic selection with a strictly higher target privilege
    /// outranks the CLIC selection
    #[test]
    fn check_basic_higher_privilege_beats_clic() {
        let (mut cluster, mut host) = cluster();
        cluster.clic_write(&mut host, 0, 0b0100_1000);
        // CLIC active in S only; M stays on the basic controller
        {
            let hart = &mut cluster.harts[0];
            hart.mode = PrivMode::Supervisor;
            hart.csrs
                .xtvec_mut(PrivMode::Supervisor)
                .set_mode(TvecMode::Clic);
            hart.csrs.mstatus.set_sie(true);
        }
        // S-mode CLIC interrupt 20 pending through the S page
        let s_page = 2 * CLIC_PAGE_BYTES;
        cluster.clic_write(&mut host, s_page + 4 * 20 + 2, 0b0100_0000);
        cluster.clic_write(&mut host, s_page + 4 * 20 + 3, 0xf0);
        cluster.clic_write(&mut host, s_page + 4 * 20 + 1, 1);
        cluster.clic_write(&mut host, s_page + 4 * 20 + 0, 1);
        let selection = cluster.harts[0].pending_interrupt().unwrap();
        assert!(selection.is_clic);
        assert_eq!(selection.target, PrivMode::Supervisor);

        // A machine timer interrupt on the basic side takes over
        let hart = &mut cluster.harts[0];
        hart.write_mie(&mut host, 1 << 7);
        hart.signal_interrupt(&mut host, 7, true);
        let selection = hart.pending_interrupt().unwrap();
        assert!(!selection.is_clic);
        assert_eq!(selection.target, PrivMode::Machine);
        assert_eq!(selection.id, 7);
    }

    /// Changing cliccfg re-selects on every hart in the cluster
    #[test]
    fn check_cliccfg_change_reselects_all_harts() {
        let mut cluster = Cluster::new(HartConfig::default(), 2).unwrap();
        let mut host = SimpleHost::new();
        // nmbits = 0: every interrupt is machine mode
        for hart in cluster.harts.iter_mut() {
            hart.csrs
                .xtvec_mut(PrivMode::Machine)
                .set_mode(TvecMode::Clic);
            hart.csrs.mstatus.set_mie(true);
            hart.refresh_interrupts(&mut host);
        }
        // Pending+enabled interrupt 20 on both harts, attr mode 00
        for hart_index in 0..2u64 {
            let page = CLIC_PAGE_BYTES * (1 + hart_index);
            cluster.clic_write(&mut host, page + 4 * 20 + 3, 0xf0);
            cluster.clic_write(&mut host, page + 4 * 20 + 1, 1);
            cluster.clic_write(&mut host, page + 4 * 20 + 0, 1);
        }
        assert!(cluster.harts[0].pending_interrupt().is_some());
        assert!(cluster.harts[1].pending_interrupt().is_some());

        // nmbits = 2: attr mode 00 now decodes as U, which the
        // M-mode harts cannot take
        cluster.clic_write(&mut host, 0, 0b0100_0000);
        assert_eq!(cluster.harts[0].pending_interrupt(), None);
        assert_eq!(cluster.harts[1].pending_interrupt(), None);
    }

    #[test]
    fn check_out_of_range_offsets_are_ignored() {
        let (mut cluster, mut host) = cluster();
        let beyond = cluster.clic_size() + 0x100;
        assert_eq!(cluster.clic_read(beyond), 0);
        cluster.clic_write(&mut host, beyond, 0xff);
        // Nothing changed in hart state
        assert_eq!(cluster.harts[0].pending_interrupt(), None);
    }

    #[test]
    fn check_attach_registers_pages() {
        let (cluster, mut host) = cluster();
        cluster.attach(&mut host);
        let base = cluster.clic_base().unwrap();
        assert_eq!(
            host.mapped_ranges(),
            &[(base, base + 4 * CLIC_PAGE_BYTES)]
        );
    }

    #[test]
    fn check_cluster_without_clic() {
        let mut config = HartConfig::default();
        config.clic = None;
        let mut cluster = Cluster::new(config, 1).unwrap();
        let mut host = SimpleHost::new();
        assert_eq!(cluster.clic_read(0), 0);
        cluster.clic_write(&mut host, 0, 0xff);
        assert_eq!(cluster.clic_base(), None);
    }

    #[test]
    fn check_rejects_empty_cluster() {
        assert_eq!(
            Cluster::new(HartConfig::default(), 0).err(),
            Some(ConfigError::NoHarts)
        );
    }
}
