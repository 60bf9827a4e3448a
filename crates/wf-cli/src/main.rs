//! WebFilter CLI
//!
//! CLI tool for loading filter lists, checking requests against them, and
//! querying the hash-based host classification service.

use std::fs;
use std::path::Path;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;

use wf_core::matcher::EmptyRedirectRegistry;
use wf_core::types::{Request, ResourceType};
use wf_core::{safebrowsing, RuleMatcher};
use wf_rules::{load_filter_list, BuildOptions};

#[derive(Parser)]
#[command(name = "wf-cli")]
#[command(about = "WebFilter rule engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load filter lists and report what was built
    Load {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Decide a request against loaded filter lists
    Check {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Request URL to check
        #[arg(short, long)]
        url: String,

        /// URL of the originating document
        #[arg(short, long, default_value = "")]
        document: String,

        /// Request resource type (script, image, xhr, ...)
        #[arg(short = 't', long, default_value = "other")]
        resource_type: String,

        /// Emit the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a host against a saved lookup response
    Classify {
        /// Host to classify
        #[arg(long)]
        host: String,

        /// File holding the raw lookup response
        #[arg(short, long)]
        response: String,
    },

    /// Query a lookup service for a host
    Lookup {
        /// Host to look up
        #[arg(long)]
        host: String,

        /// Lookup service endpoint
        #[arg(short, long)]
        server: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load { input, verbose } => cmd_load(&input, verbose),
        Commands::Check {
            input,
            url,
            document,
            resource_type,
            json,
        } => cmd_check(&input, &url, &document, &resource_type, json),
        Commands::Classify { host, response } => cmd_classify(&host, &response),
        Commands::Lookup { host, server } => cmd_lookup(&host, &server).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_matcher(inputs: &[String], verbose: bool) -> Result<RuleMatcher, String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let options = BuildOptions::default();
    let mut matcher = RuleMatcher::new();

    for (filter_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let rules = load_filter_list(&content, filter_id as i32, &options);

        if verbose {
            println!(
                "  [{}] {} - {} lines, {} rules",
                filter_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                content.lines().count(),
                rules.len()
            );
        }

        for rule in rules {
            matcher.add_rule(rule);
        }
    }
    Ok(matcher)
}

fn cmd_load(inputs: &[String], verbose: bool) -> Result<(), String> {
    let start = Instant::now();
    let matcher = load_matcher(inputs, verbose)?;

    println!("Loaded {} filter lists", inputs.len());
    println!("  Network rules:  {}", matcher.network_rule_count());
    println!("  Cosmetic rules: {}", matcher.cosmetic_rule_count());
    println!("  Script rules:   {}", matcher.script_rule_count());
    println!("  Content rules:  {}", matcher.content_rule_count());
    println!(
        "  Time:           {:.1}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

#[derive(Serialize)]
struct CheckReport<'a> {
    url: &'a str,
    document: &'a str,
    resource_type: &'a str,
    decision: &'a str,
    rule: Option<&'a str>,
}

fn cmd_check(
    inputs: &[String],
    url: &str,
    document: &str,
    resource_type: &str,
    json: bool,
) -> Result<(), String> {
    let matcher = load_matcher(inputs, false)?;

    let domain = wf_core::url::extract_host(document).unwrap_or("");
    let request = Request {
        url,
        domain,
        document_url: document,
        resource_type: ResourceType::from_request_type(resource_type),
    };

    let winner = matcher.match_request(&request);
    let decision = matcher.decide(&request, &EmptyRedirectRegistry);

    if json {
        let report = CheckReport {
            url,
            document,
            resource_type,
            decision: decision.name(),
            rule: winner.map(|r| r.rule_text()),
        };
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        println!("{out}");
    } else {
        println!("Decision: {}", decision.name());
        if let Some(rule) = winner {
            println!("  Rule: {}", rule.rule_text());
        }
    }
    Ok(())
}

fn cmd_classify(host: &str, response_path: &str) -> Result<(), String> {
    let response = fs::read_to_string(response_path)
        .map_err(|e| format!("Failed to read '{}': {}", response_path, e))?;

    let hosts = safebrowsing::extract_hosts(host);
    if hosts.is_empty() {
        return Err("Empty host".to_string());
    }
    let index = safebrowsing::build_hash_index(&hosts);

    match safebrowsing::classify(&response, &index) {
        Some(m) => println!("{} is listed in {} (via {})", host, m.list, m.host),
        None => println!("{} is not listed", host),
    }
    Ok(())
}

async fn cmd_lookup(host: &str, server: &str) -> Result<(), String> {
    let hosts = safebrowsing::extract_hosts(host);
    if hosts.is_empty() {
        return Err("Empty host".to_string());
    }
    let index = safebrowsing::build_hash_index(&hosts);
    let prefixes = safebrowsing::hash_prefixes(&index);

    let url = format!("{}?prefixes={}", server, prefixes.join(","));
    let response = reqwest::get(&url)
        .await
        .map_err(|e| format!("Lookup request failed: {}", e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("Lookup service returned {}", status));
    }
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read lookup response: {}", e))?;

    match safebrowsing::classify(&body, &index) {
        Some(m) => println!("{} is listed in {} (via {})", host, m.list, m.host),
        None => println!("{} is not listed", host),
    }
    Ok(())
}
