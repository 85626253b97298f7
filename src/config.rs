use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "waterbalance",
    about = "Non-revenue water balance across a bulk/zone/building/apartment metering network"
)]
pub struct Config {
    /// JSON file holding an array of meter rows
    #[arg(long)]
    pub meters: String,

    /// JSON file holding an array of daily zone reading rows
    #[arg(long)]
    pub daily: Option<String>,

    /// First month of the period (YYYY-MM or Mon-YY)
    #[arg(long)]
    pub start: String,

    /// Last month of the period (defaults to --start)
    #[arg(long)]
    pub end: Option<String>,

    /// Zone to open on, if present in the data
    #[arg(long)]
    pub zone: Option<String>,

    /// Month of the daily series (defaults to the latest month in --daily)
    #[arg(long)]
    pub daily_month: Option<String>,

    /// Only show meters of this zone in the hierarchy
    #[arg(long)]
    pub filter_zone: Option<String>,

    /// Only show meters of this type in the hierarchy
    #[arg(long)]
    pub meter_type: Option<String>,

    /// Zone whose L4 meters are left out of A3 (repeatable, replaces the built-in set)
    #[arg(long = "l4-excluded-zone")]
    pub l4_excluded_zones: Vec<String>,

    /// Standard deviations above the mean before a day is flagged
    #[arg(long, default_value_t = 2.0)]
    pub anomaly_sigma: f64,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,

    /// MQTT broker hostname; the report is only published when set
    #[arg(long)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT client ID
    #[arg(long, default_value = "waterbalance")]
    pub mqtt_client_id: String,

    /// MQTT topic to publish the report to
    #[arg(long, default_value = "tele/waterbalance/report")]
    pub mqtt_topic: String,
}
