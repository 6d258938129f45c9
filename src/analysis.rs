use crate::chart::{ChartWrapper, DatasetCache, DatasetKind, Plot};
use crate::clock::Clock;
use crate::config::{Config, RetryConfig};
use crate::error::Result;
use crate::events::DeviceEvent;
use crate::history::{
    fetch_day, merge, ChargerRoster, DayFetch, Debouncer, HistoryCache, HistoryFetcher, InFlight,
    MergeOutcome, PendingTimer,
};
use crate::model::{ChangeEvent, Charger, DayKey, SourceId};
use chrono::NaiveDate;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub redraw_debounce: Duration,
    pub retry: RetryConfig,
    pub grid_label: String,
    pub start_date: Option<NaiveDate>,
}

impl AnalysisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            redraw_debounce: config.analysis.redraw_debounce(),
            retry: config.analysis.retry.clone(),
            grid_label: config.chart.labels.grid_connection.clone(),
            start_date: config.analysis.date,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            redraw_debounce: Duration::from_millis(100),
            retry: RetryConfig::default(),
            grid_label: "Grid connection".to_string(),
            start_date: None,
        }
    }
}

/// Doubling delays from `initial` up to `max`, for at most `max_attempts`
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    fn new(config: &RetryConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
            attempts: 0,
        }
    }

    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }

        let factor = 1u32.checked_shl(self.attempts.min(31)).unwrap_or(u32::MAX);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempts += 1;

        Some(delay)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

struct FetchOutcome {
    source: SourceId,
    date: NaiveDate,
    result: Result<DayFetch>,
}

/// Days the displayed chart is waiting for
#[derive(Debug)]
struct DayLoad {
    remaining: HashSet<(SourceId, DayKey)>,
    failed: bool,
}

/// Keeps the 5-minute history of the energy manager and all chargers in
/// sync with the device and feeds the day chart and the status chart.
///
/// All state lives on one task; fetches are polled from [`EnergyAnalysis::run`].
pub struct EnergyAnalysis<F, P, C>
where
    F: HistoryFetcher + 'static,
    P: Plot,
    C: Clock,
{
    fetcher: Arc<F>,
    clock: C,
    settings: AnalysisSettings,
    cache: HistoryCache,
    roster: ChargerRoster,
    current_date: NaiveDate,
    in_flight: InFlight,
    fetches: FuturesUnordered<BoxFuture<'static, FetchOutcome>>,
    load: Option<DayLoad>,
    backoff: Backoff,
    retry: PendingTimer,
    redraw_debounce: Debouncer,
    day_datasets: DatasetCache,
    status_datasets: DatasetCache,
    chart: ChartWrapper<P>,
    status_chart: ChartWrapper<P>,
    grid_power: Option<f64>,
    redraws: u64,
}

impl<F, P, C> EnergyAnalysis<F, P, C>
where
    F: HistoryFetcher + 'static,
    P: Plot,
    C: Clock,
{
    pub fn new(
        fetcher: Arc<F>,
        clock: C,
        settings: AnalysisSettings,
        chart: ChartWrapper<P>,
        status_chart: ChartWrapper<P>,
    ) -> Self {
        let current_date = settings.start_date.unwrap_or_else(|| clock.today());

        Self {
            fetcher,
            backoff: Backoff::new(&settings.retry),
            redraw_debounce: Debouncer::new(settings.redraw_debounce),
            clock,
            settings,
            cache: HistoryCache::new(),
            roster: ChargerRoster::default(),
            current_date,
            in_flight: InFlight::default(),
            fetches: FuturesUnordered::new(),
            load: None,
            retry: PendingTimer::default(),
            day_datasets: DatasetCache::new(DatasetKind::Day),
            status_datasets: DatasetCache::new(DatasetKind::Status),
            chart,
            status_chart,
            grid_power: None,
            redraws: 0,
        }
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    pub fn chargers(&self) -> &[Charger] {
        self.roster.chargers()
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn chart(&self) -> &ChartWrapper<P> {
        &self.chart
    }

    pub fn status_chart(&self) -> &ChartWrapper<P> {
        &self.status_chart
    }

    /// Latest grid power reported by the meter, W
    pub fn grid_power(&self) -> Option<f64> {
        self.grid_power
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn is_loading(&self) -> bool {
        self.load.is_some()
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    pub fn fetches_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn show_chart(&mut self) {
        self.chart.show();
    }

    pub fn hide_chart(&mut self) {
        self.chart.hide();
    }

    pub fn show_status_chart(&mut self) {
        self.status_chart.show();
    }

    pub fn hide_status_chart(&mut self) {
        self.status_chart.hide();
    }

    pub fn set_current_date(&mut self, date: NaiveDate) {
        info!(%date, "showing day");
        self.current_date = date;
        self.backoff.reset();
        self.update_current_day();
    }

    /// Load every source's page for the displayed day, plus today's energy
    /// manager page for the status chart, then redraw
    pub fn update_current_day(&mut self) {
        self.chart.set_loading();
        self.retry.cancel();

        let date = self.current_date;
        let today = self.clock.today();

        let mut wanted: Vec<(SourceId, NaiveDate)> = self
            .roster
            .uids()
            .map(|uid| (SourceId::Wallbox(uid), date))
            .collect();
        wanted.push((SourceId::EnergyManager, date));
        if today != date {
            wanted.push((SourceId::EnergyManager, today));
        }

        let mut remaining = HashSet::new();
        for (source, day) in wanted {
            let key = DayKey::from_date(day);
            if self.cache.contains(source, &key) {
                continue;
            }

            self.start_fetch(source, day);
            remaining.insert((source, key));
        }

        if remaining.is_empty() {
            self.load = None;
            self.redraw();
            return;
        }

        debug!(%date, pending = remaining.len(), "loading day");
        self.load = Some(DayLoad {
            remaining,
            failed: false,
        });
    }

    /// Fetch a day unless a fetch for it is already running
    fn start_fetch(&mut self, source: SourceId, date: NaiveDate) {
        if !self.in_flight.begin(source, DayKey::from_date(date)) {
            trace!(source = %source, %date, "fetch already in flight");
            return;
        }

        let fetcher = Arc::clone(&self.fetcher);
        let today = self.clock.today();

        self.fetches.push(Box::pin(async move {
            let result = fetch_day(&*fetcher, source, date, today).await;
            FetchOutcome {
                source,
                date,
                result,
            }
        }));
    }

    fn on_fetch_complete(&mut self, outcome: FetchOutcome) {
        let FetchOutcome {
            source,
            date,
            result,
        } = outcome;
        let key = DayKey::from_date(date);
        let deferred = self.in_flight.settle(source, &key);

        let success = match result {
            Ok(DayFetch::Loaded(record)) => {
                self.cache.insert(source, key.clone(), record);

                for event in deferred {
                    if let Err(e) = merge(&mut self.cache, &event) {
                        warn!(error = %e, "dropping deferred change event");
                    }
                }

                true
            }
            Ok(DayFetch::Future) => {
                if !deferred.is_empty() {
                    debug!(
                        source = %source,
                        %date,
                        count = deferred.len(),
                        "dropping events for future day"
                    );
                }
                true
            }
            Err(e) => {
                warn!(source = %source, %date, error = %e, "could not fetch history day");
                false
            }
        };

        if let Some(load) = self.load.as_mut() {
            if load.remaining.remove(&(source, key)) {
                load.failed |= !success;

                if load.remaining.is_empty() {
                    let failed = load.failed;
                    self.load = None;

                    if failed {
                        self.schedule_retry();
                    } else {
                        self.backoff.reset();
                        self.redraw();
                    }
                }

                return;
            }
        }

        if success {
            self.redraw_debounce.schedule();
        }
    }

    fn schedule_retry(&mut self) {
        match self.backoff.next_delay() {
            Some(delay) => {
                info!(delay_ms = delay.as_millis() as u64, "retrying day load");
                self.retry.arm(delay);
            }
            None => {
                error!(
                    attempts = self.settings.retry.max_attempts,
                    date = %self.current_date,
                    "giving up loading day"
                );
            }
        }
    }

    pub fn on_charge_manager_state(&mut self, chargers: Vec<Charger>) {
        if !self.roster.update(chargers) {
            return;
        }

        info!(chargers = self.roster.chargers().len(), "charger list changed, reloading");
        self.cache.clear_wallboxes();
        self.day_datasets.clear();
        self.backoff.reset();
        self.update_current_day();
    }

    pub fn on_change_event(&mut self, event: ChangeEvent) {
        let Some(event) = self.in_flight.defer(event) else {
            trace!("change event deferred behind running fetch");
            return;
        };

        match merge(&mut self.cache, &event) {
            Ok(MergeOutcome::Patched { .. }) => self.redraw_debounce.schedule(),
            Ok(MergeOutcome::NeedsFetch { source, date }) => self.start_fetch(source, date),
            Err(e) => warn!(error = %e, "ignoring invalid change event"),
        }
    }

    pub fn on_meter_values(&mut self, power: Option<f64>) {
        trace!(?power, "meter values");
        self.grid_power = power;
    }

    pub fn handle_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::ChargeManagerState(chargers) => self.on_charge_manager_state(chargers),
            DeviceEvent::Change(change) => self.on_change_event(change),
            DeviceEvent::MeterValues { power } => self.on_meter_values(power),
        }
    }

    /// Push current datasets to both charts
    pub fn redraw(&mut self) {
        self.redraws += 1;

        let dataset = self.day_datasets.get(
            &self.cache,
            self.roster.chargers(),
            self.current_date,
            &self.settings.grid_label,
        );
        self.chart.set_data(Some(dataset));

        let status = self.status_datasets.get(
            &self.cache,
            &[],
            self.clock.today(),
            &self.settings.grid_label,
        );
        self.status_chart.set_data(Some(status));
    }

    /// Drive the analysis until the event stream ends
    pub async fn run<S>(&mut self, events: S)
    where
        S: Stream<Item = DeviceEvent>,
    {
        tokio::pin!(events);

        self.update_current_day();

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("event stream ended");
                        break;
                    }
                },
                Some(outcome) = self.fetches.next(), if !self.fetches.is_empty() => {
                    self.on_fetch_complete(outcome);
                }
                _ = self.redraw_debounce.fired() => self.redraw(),
                _ = self.retry.fired() => self.update_current_day(),
                width = self.chart.next_resize() => self.chart.resize(width),
                width = self.status_chart.next_resize() => self.status_chart.resize(width),
            }
        }
    }
}
