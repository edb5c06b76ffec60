//! Root endpoint handler for the dashboard.
//!
//! This module provides the `/` endpoint handler that serves a self-contained
//! page charting per-group history from `/api/snapshot` and `/events`.

use axum::response::{Html, IntoResponse};
use tracing::{debug, instrument};

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Herakles Software Monitor</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               margin: 0; padding: 20px; background: #0f172a; color: #e5e7eb; }
        h1 { margin: 0 0 4px 0; font-size: 1.5em; }
        .subtitle { color: #9ca3af; margin-bottom: 20px; }
        .bar { display: flex; gap: 16px; align-items: center; flex-wrap: wrap; margin-bottom: 16px; }
        .status { padding: 6px 10px; border-radius: 4px; background: #1f2937; font-size: 0.9em; }
        .status.err { background: #7f1d1d; }
        .grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(420px, 1fr)); gap: 16px; }
        .card { background: #111827; border: 1px solid #1f2937; border-radius: 8px; padding: 12px; }
        .card h2 { font-size: 1em; margin: 0 0 8px 0; color: #cbd5e1; }
        canvas { width: 100%; height: 220px; display: block; }
        table { width: 100%; border-collapse: collapse; font-size: 0.9em; }
        th, td { text-align: left; padding: 4px 8px; border-bottom: 1px solid #1f2937; }
        .dot { display: inline-block; width: 10px; height: 10px; border-radius: 50%; margin-right: 6px; }
        form { display: flex; gap: 8px; flex-wrap: wrap; }
        input, select, button { background: #1f2937; color: #e5e7eb; border: 1px solid #374151;
                                border-radius: 4px; padding: 4px 8px; }
        button { cursor: pointer; }
        a { color: #60a5fa; }
    </style>
</head>
<body>
    <h1>Herakles Software Monitor</h1>
    <div class="subtitle">Version __VERSION__ · <a href="/health">health</a> · <a href="/metrics">metrics</a></div>

    <div class="bar">
        <label>Window
            <select id="windowSelect">
                <option value="5m">5 min</option>
                <option value="30m" selected>30 min</option>
                <option value="1h">1 hour</option>
                <option value="4h">4 hours</option>
                <option value="12h">12 hours</option>
                <option value="1d">1 day</option>
                <option value="1w">1 week</option>
            </select>
        </label>
        <span id="status" class="status">loading…</span>
    </div>

    <div class="card" style="margin-bottom:16px">
        <h2>WinRM credentials</h2>
        <form id="winrmForm">
            <input name="host" placeholder="host (default from config)">
            <input name="port" type="number" placeholder="5985">
            <input name="username" placeholder="username" required>
            <input name="password" type="password" placeholder="password" required>
            <label><input name="use_ssl" type="checkbox"> HTTPS</label>
            <button type="submit">Connect</button>
            <span id="winrmResult"></span>
        </form>
    </div>

    <div class="grid">
        <div class="card"><h2>CPU (%)</h2><canvas id="chartCpu"></canvas></div>
        <div class="card"><h2>Memory (MiB)</h2><canvas id="chartMem"></canvas></div>
        <div class="card"><h2>Processes</h2><canvas id="chartProc"></canvas></div>
        <div class="card"><h2>Latest</h2>
            <table><thead><tr><th>Software</th><th>Procs</th><th>CPU %</th><th>MiB</th></tr></thead>
            <tbody id="latest"></tbody></table>
        </div>
    </div>

<script>
const WINDOWS = { '5m': 300, '30m': 1800, '1h': 3600, '4h': 14400, '12h': 43200, '1d': 86400, '1w': 604800 };
const PALETTE = ['#60a5fa', '#34d399', '#fbbf24', '#f87171', '#a78bfa', '#fb7185', '#22d3ee', '#f59e0b'];
let windowSecs = WINDOWS['30m'];
let snapshot = {};

function colorFor(i) { return PALETTE[i % PALETTE.length]; }

function drawChart(canvas, series, field, scale) {
    const ctx = canvas.getContext('2d');
    const w = canvas.width = canvas.clientWidth;
    const h = canvas.height = canvas.clientHeight;
    ctx.clearRect(0, 0, w, h);
    const now = Date.now() / 1000;
    const from = now - windowSecs;
    let max = 0;
    series.forEach(s => s.points.forEach(p => { if (p.t >= from) max = Math.max(max, p[field] * scale); }));
    if (max <= 0) max = 1;
    ctx.strokeStyle = '#1f2937';
    for (let i = 0; i <= 4; i++) { const y = h - (h * i / 4); ctx.beginPath(); ctx.moveTo(0, y); ctx.lineTo(w, y); ctx.stroke(); }
    ctx.fillStyle = '#9ca3af';
    ctx.fillText(max.toFixed(1), 4, 12);
    series.forEach((s, idx) => {
        ctx.strokeStyle = colorFor(idx);
        ctx.lineWidth = 2;
        ctx.beginPath();
        let started = false;
        s.points.forEach(p => {
            if (p.t < from) return;
            const x = (p.t - from) / windowSecs * w;
            const y = h - (p[field] * scale) / max * (h - 16);
            if (!started) { ctx.moveTo(x, y); started = true; } else { ctx.lineTo(x, y); }
        });
        ctx.stroke();
    });
}

function render() {
    const series = Object.values(snapshot).sort((a, b) => a.display_name.localeCompare(b.display_name));
    drawChart(document.getElementById('chartCpu'), series, 'cpu', 1);
    drawChart(document.getElementById('chartMem'), series, 'mem', 1 / 1048576);
    drawChart(document.getElementById('chartProc'), series, 'process_count', 1);
    const body = document.getElementById('latest');
    body.innerHTML = '';
    series.forEach((s, idx) => {
        const last = s.points[s.points.length - 1];
        if (!last) return;
        const tr = document.createElement('tr');
        const name = document.createElement('td');
        const dot = document.createElement('span');
        dot.className = 'dot';
        dot.style.background = colorFor(idx);
        name.appendChild(dot);
        name.appendChild(document.createTextNode(s.display_name));
        tr.appendChild(name);
        [last.process_count, last.cpu.toFixed(1), (last.mem / 1048576).toFixed(1)].forEach(v => {
            const td = document.createElement('td');
            td.textContent = v;
            tr.appendChild(td);
        });
        body.appendChild(tr);
    });
}

async function refreshStatus() {
    try {
        const res = await fetch('/api/status');
        const { status } = await res.json();
        const el = document.getElementById('status');
        el.textContent = `mode: ${status.mode} · winrm: ${status.winrm_configured ? 'configured' : 'not configured'}` +
            (status.last_error ? ` · error: ${status.last_error}` : '');
        el.className = status.last_error ? 'status err' : 'status';
    } catch (e) { /* retried on next tick */ }
}

async function loadSnapshot() {
    const res = await fetch('/api/snapshot');
    snapshot = (await res.json()).data;
    render();
}

document.getElementById('windowSelect').addEventListener('change', ev => {
    windowSecs = WINDOWS[ev.target.value];
    render();
});

document.getElementById('winrmForm').addEventListener('submit', async ev => {
    ev.preventDefault();
    const form = new FormData(ev.target);
    const body = { username: form.get('username'), password: form.get('password'), use_ssl: form.get('use_ssl') === 'on' };
    if (form.get('host')) body.host = form.get('host');
    if (form.get('port')) body.port = Number(form.get('port'));
    const res = await fetch('/api/winrm', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
    const out = await res.json();
    document.getElementById('winrmResult').textContent = out.ok ? 'connected' : out.error;
    refreshStatus();
});

const events = new EventSource('/events');
events.onmessage = ev => { snapshot = JSON.parse(ev.data).data; render(); };

loadSnapshot();
refreshStatus();
setInterval(refreshStatus, 5000);
window.addEventListener('resize', render);
</script>
</body>
</html>
"##;

/// Handler for the root `/` endpoint.
#[instrument]
pub async fn root_handler() -> impl IntoResponse {
    debug!("Processing / request");
    Html(DASHBOARD_HTML.replace("__VERSION__", env!("CARGO_PKG_VERSION")))
}
