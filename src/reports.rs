use chrono::Local;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::history::HistoryLedger;
use crate::types::LotteryConfig;
use crate::utils::format_timestamp;

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the winners' honor roll with the remaining inventory.
pub fn generate_history_report(config: &LotteryConfig, history: &HistoryLedger) -> String {
    let mut html = String::new();

    html.push_str(&format!(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Lucky Draw Honor Roll</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, sans-serif;
            margin: 0;
            padding: 20px;
            background: linear-gradient(135deg, #7f1d1d 0%, #b45309 100%);
            min-height: 100vh;
        }}
        .container {{
            max-width: 1000px;
            margin: 0 auto;
            background: #fffbeb;
            border-radius: 15px;
            box-shadow: 0 20px 40px rgba(0,0,0,0.25);
            overflow: hidden;
        }}
        .header {{
            background: linear-gradient(135deg, #dc2626, #f59e0b);
            color: white;
            padding: 30px;
            text-align: center;
        }}
        .header h1 {{
            margin: 0;
            font-size: 2.4em;
            text-shadow: 2px 2px 4px rgba(0,0,0,0.3);
        }}
        .content {{
            padding: 30px;
        }}
        .stats-grid {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 15px;
            margin-bottom: 30px;
        }}
        .stat-item {{
            background: white;
            padding: 15px;
            border-radius: 8px;
            text-align: center;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        .stat-number {{
            font-size: 1.8em;
            font-weight: 700;
            color: #b91c1c;
        }}
        .stat-label {{
            color: #92400e;
            font-size: 0.9em;
        }}
        .winner-card {{
            display: flex;
            gap: 24px;
            align-items: center;
            background: white;
            border: 2px solid #fcd34d;
            border-radius: 12px;
            padding: 18px;
            margin-bottom: 14px;
        }}
        .winner-number {{
            font-family: 'Courier New', monospace;
            font-size: 2.4em;
            font-weight: 700;
            color: #b45309;
            min-width: 140px;
        }}
        .winner-prize {{
            font-weight: 700;
            font-size: 1.2em;
            color: #7f1d1d;
        }}
        .winner-time {{
            font-size: 0.8em;
            color: #a16207;
        }}
        .winner-message {{
            font-style: italic;
            color: #451a03;
            margin-top: 6px;
        }}
        .empty {{
            text-align: center;
            color: #a16207;
            padding: 60px 0;
        }}
        .footer {{
            background: #451a03;
            color: #fde68a;
            padding: 20px;
            text-align: center;
            font-size: 0.9em;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>🏆 Lucky Draw Honor Roll</h1>
        </div>
        <div class="content">
            <div class="stats-grid">
                <div class="stat-item">
                    <div class="stat-number">{}</div>
                    <div class="stat-label">Winners drawn</div>
                </div>
                <div class="stat-item">
                    <div class="stat-number">{}</div>
                    <div class="stat-label">Prizes remaining</div>
                </div>
                <div class="stat-item">
                    <div class="stat-number">0 – {}</div>
                    <div class="stat-label">Number range</div>
                </div>
            </div>
"#,
        history.len(),
        config.prizes.total_remaining(),
        config.draw.max_number
    ));

    html.push_str("            <div class=\"stats-grid\">\n");
    for prize in config.prizes.by_rank() {
        html.push_str(&format!(
            r#"                <div class="stat-item">
                    <div class="stat-number">{} / {}</div>
                    <div class="stat-label">{}</div>
                </div>
"#,
            prize.remaining,
            prize.count,
            escape_html(&prize.name)
        ));
    }
    html.push_str("            </div>\n");

    if history.is_empty() {
        html.push_str("            <div class=\"empty\">No winners yet. Start the first draw!</div>\n");
    }

    for winner in history.iter() {
        html.push_str(&format!(
            r#"            <div class="winner-card">
                <div class="winner-number">{}</div>
                <div>
                    <div class="winner-prize">{}</div>
                    <div class="winner-time">{}</div>
                    <div class="winner-message">"{}"</div>
                </div>
            </div>
"#,
            escape_html(&winner.number),
            escape_html(&winner.prize_name),
            format_timestamp(winner.timestamp),
            escape_html(&winner.message)
        ));
    }

    html.push_str(&format!(
        r#"        </div>
        <div class="footer">
            <p>📅 Report generated: {}</p>
        </div>
    </div>
</body>
</html>
"#,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    html
}

pub fn report_filename() -> String {
    format!("winners_report_{}.html", Local::now().format("%Y%m%d_%H%M%S"))
}

pub fn save_html_report_to_path(
    html_content: &str,
    filename: &str,
    report_path: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let filepath = Path::new(report_path).join(filename);

    if let Some(parent) = filepath.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&filepath)?;
    file.write_all(html_content.as_bytes())?;
    Ok(filepath)
}

pub fn generate_and_save_report_to_path(
    config: &LotteryConfig,
    history: &HistoryLedger,
    report_path: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let html_content = generate_history_report(config, history);
    save_html_report_to_path(&html_content, &report_filename(), report_path)
}
