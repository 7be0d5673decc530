//! TC classifier pair for label multiplexing.
//!
//! `ingress` is attached to the external interface: it reads the label tag,
//! clears it and redirects the packet into the ingress path of the managed
//! interface registered for that label.
//!
//! `egress` is attached to every managed interface: it stamps the device's
//! label into the tag byte and redirects the packet out of the external
//! interface.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::TC_ACT_SHOT,
    helpers::bpf_redirect,
    macros::{classifier, map},
    maps::HashMap,
    programs::TcContext,
};
use aya_log_ebpf::debug;

use l3mp_programs::{BPF_F_INGRESS, EgressSettings, LABEL_CAPACITY, TAG_OFFSET, tag, untag};

/// Label to managed interface index
#[map]
static INGRESS_DESTINATIONS: HashMap<u32, u32> = HashMap::with_max_entries(LABEL_CAPACITY, 0);

/// Managed interface index to egress settings
#[map]
static EGRESS_SETTINGS: HashMap<u32, EgressSettings> =
    HashMap::with_max_entries(LABEL_CAPACITY, 0);

#[classifier]
pub fn egress(ctx: TcContext) -> i32 {
    match try_egress(&ctx) {
        Ok(action) => action,
        Err(_) => TC_ACT_SHOT,
    }
}

#[inline(always)]
fn try_egress(ctx: &TcContext) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    if data + TAG_OFFSET + 1 > data_end {
        return Ok(TC_ACT_SHOT);
    }

    let if_index = unsafe { (*ctx.skb.skb).ifindex };
    let settings = match unsafe { EGRESS_SETTINGS.get(&if_index) } {
        Some(s) => *s,
        None => {
            debug!(ctx, "no egress settings for ifindex {}", if_index);
            return Ok(TC_ACT_SHOT);
        }
    };

    unsafe {
        let tag_ptr = (data + TAG_OFFSET) as *mut u8;
        *tag_ptr = tag(*tag_ptr, settings.label);
    }

    let ret = unsafe { bpf_redirect(settings.external_ifindex, 0) };
    Ok(ret as i32)
}

#[classifier]
pub fn ingress(ctx: TcContext) -> i32 {
    match try_ingress(&ctx) {
        Ok(action) => action,
        Err(_) => TC_ACT_SHOT,
    }
}

#[inline(always)]
fn try_ingress(ctx: &TcContext) -> Result<i32, ()> {
    let data = ctx.data();
    let data_end = ctx.data_end();

    if data + TAG_OFFSET + 1 > data_end {
        return Ok(TC_ACT_SHOT);
    }

    let label = unsafe {
        let tag_ptr = (data + TAG_OFFSET) as *mut u8;
        let (label, original) = untag(*tag_ptr);
        *tag_ptr = original;
        label
    };

    let target = match unsafe { INGRESS_DESTINATIONS.get(&label) } {
        Some(t) => *t,
        None => {
            debug!(ctx, "no destination for label {}", label);
            return Ok(TC_ACT_SHOT);
        }
    };

    let ret = unsafe { bpf_redirect(target, BPF_F_INGRESS) };
    Ok(ret as i32)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
