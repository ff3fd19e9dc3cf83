//! The MAC engine: lifecycle coordination and the event loop wiring every
//! subsystem together.
//!
//! The engine is one async task. Every worker of the design — the tunnel
//! reader, the control-message pump, the scheduler, the subframe timer and
//! the timeout sweeper — is an arm of its select loop, so the loops are
//! serialized through one fair work queue and the shared state needs no
//! further locking. Destructive transitions (Reconfig, Stop) are taken
//! between events, once the sub-mode flags show the affected paths
//! quiescent.

use alloc::vec::Vec;

use embassy_futures::select::{select3, select4, Either3, Either4};

mod commander;
mod control;
mod state;

pub use commander::{MacCommander, RequestResponder};
pub use state::{ExecMode, SubModes};

use commander::MacHandler;
use state::MacState;

use crate::{
    cosora::FusionOutcome,
    params::{CurrentParameters, ParamStore},
    sap::{
        start::{StartConfirm, StartRequest},
        status::{StatusConfirm, StatusRequest},
        stop::{StopConfirm, StopRequest},
        update::{ParamUpdate, UpdateConfirm, UpdateRequest},
        RequestValue, Status,
    },
    scheduler,
    time::DelayNsExt,
    tun::TunDevice,
    phy::Phy,
    wire::messages::{self, BsSubframeTxStart, ControlMessage, UeSubframeTxStart},
    MacRole, PeerId,
};

/// Guard interval for PHYConfig.Response, in nanoseconds.
const PHY_GUARD_NS: u32 = 1_000_000_000;

/// Configuration handed to the engine.
pub struct MacConfig<S: ParamStore, D: DelayNsExt> {
    /// Persistence of the parameter images.
    pub store: S,
    /// Time source for the subframe tick and guard timers.
    pub delay: D,
}

/// Run the MAC layer.
///
/// This is an async function that should always be polled in the
/// background. The given [`MacCommander`] is the method of communicating
/// with the MAC.
pub async fn run_mac_engine<'a, S: ParamStore, D: DelayNsExt>(
    mut phy: impl Phy + 'a,
    mut tun: impl TunDevice + 'a,
    commander: &'a MacCommander,
    mut config: MacConfig<S, D>,
) -> ! {
    let handler = commander.get_handler();

    loop {
        info!("System entering STANDBY mode");
        let responder = wait_for_start(&handler).await;

        info!("System entering CONFIG mode");
        let mut state = match configure(&mut config.store) {
            Ok(state) => state,
            Err(status) => {
                responder.respond(StartConfirm { status });
                continue;
            }
        };
        responder.respond(StartConfirm {
            status: Status::Success,
        });

        info!("System entering START mode");
        state.set_mode(ExecMode::Start);
        if !bring_up_phy(&mut phy, &mut state, &handler, &mut config.delay).await {
            continue;
        }

        info!("System entering IDLE mode");
        state.set_mode(ExecMode::Idle);
        run_configured(&mut phy, &mut tun, &handler, &mut config, &mut state).await;
        // Dropping the state tears every subsystem down on the way back
        // to standby.
    }
}

/// Serve standby-mode requests until a start request arrives.
async fn wait_for_start<'a>(handler: &'a MacHandler<'_>) -> RequestResponder<'a, StartRequest> {
    loop {
        let responder = handler.wait_for_request().await;
        match &responder.request {
            RequestValue::Start(_) => return responder.into_concrete(),
            RequestValue::Status(_) => {
                responder.into_concrete::<StatusRequest>().respond(StatusConfirm {
                    mode: ExecMode::Standby,
                    subframe: 0,
                    counters: Default::default(),
                })
            }
            RequestValue::Stop(_) => responder
                .into_concrete::<StopRequest>()
                .respond(StopConfirm {
                    status: Status::InvalidState,
                }),
            RequestValue::Update(_) => responder
                .into_concrete::<UpdateRequest>()
                .respond(UpdateConfirm {
                    status: Status::InvalidState,
                }),
        }
    }
}

/// The Config entry actions: load the persisted parameters and build the
/// component stack from them.
fn configure<S: ParamStore>(store: &mut S) -> Result<MacState, Status> {
    let image = store.load_current().or_else(|e| {
        debug!("No current parameter image, falling back to defaults: {:?}", e);
        store.load_default()
    });
    let image = match image {
        Ok(image) => image,
        Err(e) => {
            error!("No parameter image available: {:?}", e);
            return Err(Status::ConfigInvalid);
        }
    };

    let current = CurrentParameters::parse(&image).map_err(|e| {
        error!("Parameter file invalid at line {}", e.line);
        Status::ConfigInvalid
    })?;

    let state = MacState::configure(current);

    if let Err(e) = store.store_current(&state.current.render()) {
        warn!("Could not persist the applied parameters: {:?}", e);
    }

    Ok(state)
}

/// The Start entry actions: send PHYConfig.Request and wait for the
/// response, repeating the request when the guard interval elapses.
///
/// Returns false when the bring-up was aborted and the engine should fall
/// back to standby.
async fn bring_up_phy<P: Phy, D: DelayNsExt>(
    phy: &mut P,
    state: &mut MacState,
    handler: &MacHandler<'_>,
    delay: &mut D,
) -> bool {
    loop {
        if let Err(e) = phy.send_control(messages::config_request()).await {
            error!("Could not send PHYConfig.Request: {:?}", e);
            return false;
        }

        let mut guard = delay.clone();
        match select3(
            phy.receive_control(),
            handler.wait_for_request(),
            guard.delay_ns(PHY_GUARD_NS),
        )
        .await
        {
            Either3::First(Ok(message)) => match ControlMessage::parse(&message) {
                Ok(ControlMessage::ConfigResponse) => return true,
                _ => trace!("Ignoring message while waiting for PHYConfig.Response"),
            },
            Either3::First(Err(e)) => {
                error!("L1 control channel failed: {:?}", e);
                return false;
            }
            Either3::Second(responder) => match &responder.request {
                RequestValue::Stop(_) => {
                    state.set_mode(ExecMode::Stop);
                    responder
                        .into_concrete::<StopRequest>()
                        .respond(StopConfirm {
                            status: Status::Success,
                        });
                    return false;
                }
                RequestValue::Status(_) => responder
                    .into_concrete::<StatusRequest>()
                    .respond(status_snapshot(state)),
                RequestValue::Start(_) => responder
                    .into_concrete::<StartRequest>()
                    .respond(StartConfirm {
                        status: Status::InvalidState,
                    }),
                RequestValue::Update(_) => responder
                    .into_concrete::<UpdateRequest>()
                    .respond(UpdateConfirm {
                        status: Status::InvalidState,
                    }),
            },
            Either3::Third(()) => warn!("PHY not ready, repeating PHYConfig.Request"),
        }
    }
}

/// The main event loop: Idle, with excursions into Reconfig, until an
/// orderly Stop completes.
async fn run_configured<'a, S: ParamStore, D: DelayNsExt>(
    phy: &mut impl Phy,
    tun: &mut impl TunDevice,
    handler: &'a MacHandler<'_>,
    config: &mut MacConfig<S, D>,
    state: &mut MacState,
) {
    let mut stop_responder: Option<RequestResponder<'a, StopRequest>> = None;
    let mut stop_ready = false;

    loop {
        // Destructive transitions happen between events, when the worker
        // paths involved are quiescent.
        if stop_ready && state.sub_modes.all_quiescent() && !state.cosora.is_busy() {
            state.set_mode(ExecMode::Stop);
            info!("System entering STOP mode");
            if let Some(responder) = stop_responder.take() {
                responder.respond(StopConfirm {
                    status: Status::Success,
                });
            }
            return;
        }

        let stopping = stop_ready || stop_responder.is_some();
        if !stopping
            && (state.cli_reconfig || state.system_reconfig)
            && !state.sub_modes.rx_active()
            && !state.sub_modes.tx_active()
        {
            reconfigure(phy, &mut config.store, state).await;
        }

        let mut tick_delay = config.delay.clone();
        match select4(
            phy.receive_control(),
            tun.receive(),
            handler.wait_for_request(),
            tick_delay.delay_subframes(1),
        )
        .await
        {
            Either4::First(Ok(message)) => {
                if let Err(e) =
                    handle_control_message(state, phy, tun, &message, &mut stop_ready).await
                {
                    error!("L1 channel failed: {:?}", e);
                    stop_ready = true;
                }
            }
            Either4::First(Err(e)) => {
                error!("L1 control channel failed: {:?}", e);
                stop_ready = true;
            }
            Either4::Second(Ok(Some(packet))) => {
                state.sub_modes.set_tun(true);
                let now = state.clock.now();
                match state.buffers.enqueue_data(&packet, &state.resolver, now) {
                    Ok(peer) => trace!("Data SDU queued for peer {}", peer),
                    Err(reason) => debug!("Dropped tunnel packet: {:?}", reason),
                }
                state.sub_modes.set_tun(false);
            }
            Either4::Second(Ok(None)) => {
                // Tunnel poll timeout, nothing to read.
            }
            Either4::Second(Err(e)) => {
                error!("Tunnel device failed: {:?}", e);
                stop_ready = true;
            }
            Either4::Third(responder) => {
                if handle_request(state, phy, responder, &mut stop_responder, stopping).await {
                    stop_ready = true;
                }
            }
            Either4::Fourth(()) => handle_tick(state, stopping),
        }
    }
}

/// One subframe elapsed: advance the clock, sweep expired data SDUs and
/// check the fusion window.
fn handle_tick(state: &mut MacState, stopping: bool) {
    let now = state.clock.advance();
    state
        .buffers
        .timeout_sweep(now, state.current.ip_timeout as u64);

    if let Some(FusionOutcome::Changed(fused)) =
        state.cosora.poll(now, state.current.dynamic.fusion_lut)
    {
        state.staged.fusion_lut = fused;
        if !stopping {
            state.system_reconfig = true;
        }
    }
}

/// Dispatch one control message from the PHY.
async fn handle_control_message<P: Phy, T: TunDevice>(
    state: &mut MacState,
    phy: &mut P,
    tun: &mut T,
    message: &[u8],
    stop_ready: &mut bool,
) -> Result<(), P::Error> {
    let parsed = match ControlMessage::parse(message) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Undecodable control message: {:?}", e);
            return Ok(());
        }
    };

    match (parsed, state.current.role) {
        (ControlMessage::ConfigResponse, _) => debug!("Spurious PHYConfig.Response"),
        (ControlMessage::StopResponse, _) => {
            debug!("PHYStop.Response received");
            *stop_ready = true;
        }
        (ControlMessage::BsRxStart(metrics), MacRole::BaseStation) => {
            control::receive_subframe_bs(state, phy, tun, metrics).await?;
        }
        (ControlMessage::UeRxStart(parameters), MacRole::UserEquipment) => {
            control::receive_subframe_ue(state, phy, tun, parameters).await?;
        }
        (ControlMessage::SubframeEnd, _) => {
            trace!("Subframe.End received");
            state.sub_modes.set_rx(false);
        }
        (ControlMessage::TxIndication, _) => transmit_subframe(state, phy).await?,
        (_, _) => {
            warn!("Unexpected control message");
            state.sub_modes.set_rx(false);
        }
    }

    Ok(())
}

/// PHYTx.Indication: schedule and transmit the next subframe.
async fn transmit_subframe<P: Phy>(state: &mut MacState, phy: &mut P) -> Result<(), P::Error> {
    if state.mode != ExecMode::Idle {
        return Ok(());
    }

    state.sub_modes.set_tx(true);
    let result = try_transmit_subframe(state, phy).await;
    state.sub_modes.set_tx(false);
    result
}

async fn try_transmit_subframe<P: Phy>(
    state: &mut MacState,
    phy: &mut P,
) -> Result<(), P::Error> {
    let subframe = state.clock.now() as u32;

    if state.current.role.is_base_station() {
        let pdus = scheduler::schedule_bs(&state.current, &mut state.buffers, subframe);
        if pdus.is_empty() {
            return Ok(());
        }

        // One uplink reservation per distinct served UE, in PDU order.
        let mut served: Vec<PeerId> = Vec::new();
        for pdu in &pdus {
            if !served.contains(&pdu.allocation.target_peer) {
                served.push(pdu.allocation.target_peer);
            }
        }
        let ul_reservations = served
            .iter()
            .filter_map(|&peer| {
                state
                    .current
                    .dynamic
                    .link(peer)
                    .map(|link| link.ul_reservation)
            })
            .collect();

        let parameters = BsSubframeTxStart {
            num_ues: served.len() as u8,
            num_pdus: pdus.len() as u8,
            ul_reservations,
            numerology: state.current.numerology,
            gfdm: state.current.gfdm,
            fusion_lut: state.current.dynamic.fusion_lut,
            rx_metric_periodicity: state.current.dynamic.rx_metric_periodicity,
        };

        phy.send_control(messages::bs_tx_start(&parameters)).await?;
        crate::phy::send_pdus(phy, pdus).await?;
        phy.send_control(messages::subframe_end()).await?;
    } else {
        let Some(pdu) = scheduler::schedule_ue(&state.current, &mut state.buffers, subframe)
        else {
            return Ok(());
        };

        let parameters = UeSubframeTxStart {
            ul_reservation: pdu.allocation,
            numerology: state.current.numerology,
            gfdm: state.current.gfdm,
            rx_metric_periodicity: state.current.dynamic.rx_metric_periodicity,
        };

        phy.send_control(messages::ue_tx_start(&parameters)).await?;
        crate::phy::send_pdus(phy, alloc::vec![pdu]).await?;
        phy.send_control(messages::subframe_end()).await?;
    }

    Ok(())
}

/// Apply the staged parameters. Only called with the Rx and Tx paths
/// quiescent, so no subframe in flight ever observes a half-applied
/// configuration.
async fn reconfigure<P: Phy, S: ParamStore>(phy: &mut P, store: &mut S, state: &mut MacState) {
    state.set_mode(ExecMode::Reconfig);
    info!("System entering RECONFIG mode");

    if state.current.role.is_base_station() {
        if state.cli_reconfig {
            state.current.ues_outdated = true;
        } else if state.staged.fusion_lut != state.current.dynamic.fusion_lut {
            debug!("Fusion lookup table changed, sending new value to PHY");
            if let Err(e) = phy
                .send_control(messages::fusion_lut_update(state.staged.fusion_lut))
                .await
            {
                error!("Could not push the fusion LUT to PHY: {:?}", e);
            }
        }

        state.current.apply_dynamic(&state.staged);

        if state.current.ues_outdated {
            state.enqueue_parameter_push();
            state.current.ues_outdated = false;
        }
    } else {
        state.current.apply_dynamic(&state.staged);
    }

    if let Err(e) = store.store_current(&state.current.render()) {
        warn!("Could not persist the applied parameters: {:?}", e);
    }

    state.cli_reconfig = false;
    state.system_reconfig = false;

    state.set_mode(ExecMode::Idle);
    info!("System entering IDLE mode");
}

/// Serve one operator request while configured. Returns true when the
/// engine must force its way to Stop because the PHY is unreachable.
async fn handle_request<'a, P: Phy>(
    state: &mut MacState,
    phy: &mut P,
    responder: RequestResponder<'a, RequestValue>,
    stop_responder: &mut Option<RequestResponder<'a, StopRequest>>,
    stopping: bool,
) -> bool {
    match &responder.request {
        RequestValue::Status(_) => {
            responder
                .into_concrete::<StatusRequest>()
                .respond(status_snapshot(state));
        }
        RequestValue::Start(_) => {
            responder
                .into_concrete::<StartRequest>()
                .respond(StartConfirm {
                    status: Status::InvalidState,
                });
        }
        RequestValue::Stop(_) => {
            let responder = responder.into_concrete::<StopRequest>();
            if stopping {
                responder.respond(StopConfirm {
                    status: Status::InvalidState,
                });
                return false;
            }

            let failed = phy.send_control(messages::stop_request()).await.is_err();
            if failed {
                error!("Could not send PHYStop.Request");
            }
            // Answered once the system is back in standby.
            *stop_responder = Some(responder);
            return failed;
        }
        RequestValue::Update(_) => {
            let responder = responder.into_concrete::<UpdateRequest>();
            let status = stage_updates(state, &responder.request);
            responder.respond(UpdateConfirm { status });
        }
    }

    false
}

/// Stage the operator's parameter changes and request a reconfiguration.
fn stage_updates(state: &mut MacState, request: &UpdateRequest) -> Status {
    if !state.current.role.is_base_station() {
        return Status::InvalidState;
    }

    // Validate everything before touching the staging.
    for update in &request.updates {
        match update {
            ParamUpdate::FusionLut(_) | ParamUpdate::RxMetricPeriodicity(_) => {}
            ParamUpdate::UlReservation(allocation) => {
                if !allocation.is_valid() {
                    return Status::InvalidState;
                }
                if state.staged.link(allocation.target_peer).is_none() {
                    return Status::UnknownPeer;
                }
            }
            ParamUpdate::McsDownlink(peer, _)
            | ParamUpdate::McsUplink(peer, _)
            | ParamUpdate::Mimo(peer, _)
            | ParamUpdate::Tpc(peer, _) => {
                if state.staged.link(*peer).is_none() {
                    return Status::UnknownPeer;
                }
            }
        }
    }

    for update in &request.updates {
        match *update {
            ParamUpdate::FusionLut(lut) => state.staged.fusion_lut = lut & 0b1111,
            ParamUpdate::RxMetricPeriodicity(periodicity) => {
                state.staged.rx_metric_periodicity = periodicity & 0b1111
            }
            ParamUpdate::UlReservation(allocation) => {
                state
                    .staged
                    .link_mut(allocation.target_peer)
                    .unwrap()
                    .ul_reservation = allocation
            }
            ParamUpdate::McsDownlink(peer, mcs) => {
                state.staged.link_mut(peer).unwrap().mcs_downlink = mcs & 0b1111
            }
            ParamUpdate::McsUplink(peer, mcs) => {
                state.staged.link_mut(peer).unwrap().mcs_uplink = mcs & 0b1111
            }
            ParamUpdate::Mimo(peer, mimo) => state.staged.link_mut(peer).unwrap().mimo = mimo,
            ParamUpdate::Tpc(peer, tpc) => {
                state.staged.link_mut(peer).unwrap().tpc = tpc & 0b11_1111
            }
        }
    }

    state.cli_reconfig = true;
    Status::Success
}

fn status_snapshot(state: &MacState) -> StatusConfirm {
    StatusConfirm {
        mode: state.mode,
        subframe: state.clock.now(),
        counters: state.buffers.counters,
    }
}
