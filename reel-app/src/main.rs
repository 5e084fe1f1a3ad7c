use anyhow::Context;
use reel_app::session::DRY_RUN_PROMO;
use reel_app::{telemetry, BookingFlow, ClientSession};
use reel_catalog::InventoryState;
use reel_hold::format_remaining;
use reel_order::PaymentOutcome;
use reel_shared::{PaymentMethod, SeatStatus};
use reel_store::Config;

/// Smoke run: load one showtime's seat map, hold the first free seat and
/// show the countdown. Against a live API the hold is then released. With
/// `--dry-run` everything runs in memory and the hold is taken through
/// checkout and payment.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let mut dry_run = false;
    let mut showtime_id = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            _ => showtime_id = Some(arg),
        }
    }
    let config = Config::load().context("Failed to load config")?;

    let (session, showtime_id) = if dry_run {
        let showtime_id = showtime_id.unwrap_or_else(|| "st-dry-run".to_string()).into();
        tracing::info!("Dry run against an in-memory cinema API");
        (ClientSession::dry_run(&config, &showtime_id), showtime_id)
    } else {
        let showtime_id = showtime_id.context("usage: reel-app [--dry-run] <showtime-id>")?;
        tracing::info!("Using cinema API at {}", config.api.base_url);
        (ClientSession::from_config(&config)?, showtime_id.into())
    };
    let mut flow = BookingFlow::open(session, showtime_id).await?;

    let free = match flow.inventory().state() {
        InventoryState::Ready(seats) => {
            let total = seats.len();
            let free: Vec<_> = seats.into_iter().filter(|s| s.status == SeatStatus::Available).collect();
            tracing::info!("{} of {} seats available", free.len(), total);
            free
        }
        other => anyhow::bail!("Seat map not ready: {:?}", other),
    };

    if let Some(seat) = free.first() {
        flow.toggle_seat(&seat.id)?;
        flow.hold_seats().await?;
        if let Some(remaining) = flow.remaining() {
            tracing::info!("Holding {} for {}", seat.label(), format_remaining(remaining));
        }
        if dry_run {
            checkout(&mut flow).await?;
        }
    }
    for notice in flow.take_notices() {
        tracing::warn!("{:?}", notice);
    }

    flow.leave().await;
    Ok(())
}

async fn checkout(flow: &mut BookingFlow) -> anyhow::Result<()> {
    let checkout = flow.checkout_mut()?;
    let summary = checkout.review().await?;
    tracing::info!("Reviewing {} seat(s), {} total", summary.seats.len(), summary.seat_total());
    checkout.proceed_to_snacks()?;
    checkout.submit_snacks().await?;
    let booking = checkout.apply_promo(DRY_RUN_PROMO).await?;
    tracing::info!(booking_id = %booking.id, total = booking.total, "Promo applied");

    match flow.pay(PaymentMethod::Card).await? {
        PaymentOutcome::Succeeded { booking } => tracing::info!(booking_id = %booking.id, "Booking confirmed"),
        other => tracing::warn!("Payment did not complete: {:?}", other),
    }
    Ok(())
}
