//! Bootstrap script generation for the mail server VM.
//!
//! Renders the shell script the custom script extension runs on first
//! boot: installs docker and docker-compose, clones and configures
//! Mailcow non-interactively, opens the firewall, obtains a Let's
//! Encrypt certificate over the HTTP challenge, and fronts the stack
//! with an nginx reverse proxy.
//!
//! The provisioner treats the rendered script as opaque content; this
//! module is the default producer.

/// Inputs for rendering the bootstrap script.
#[derive(Debug, Clone)]
pub struct BootstrapScript {
    /// Fully qualified mail host (e.g. `smtp.example.com`).
    pub fqdn: String,
    /// Mailcow admin email; also the ACME account email.
    pub admin_email: String,
    /// Mailcow admin password.
    pub admin_password: String,
}

impl BootstrapScript {
    /// Creates a script definition.
    #[must_use]
    pub fn new(
        fqdn: impl Into<String>,
        admin_email: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            fqdn: fqdn.into(),
            admin_email: admin_email.into(),
            admin_password: admin_password.into(),
        }
    }

    /// The apex domain, stripped of the service label.
    #[must_use]
    pub fn base_domain(&self) -> &str {
        if self.fqdn.matches('.').count() > 1 {
            self.fqdn
                .split_once('.')
                .map_or(self.fqdn.as_str(), |(_, rest)| rest)
        } else {
            &self.fqdn
        }
    }

    /// Renders the full setup script.
    #[must_use]
    pub fn render(&self) -> String {
        let fqdn = &self.fqdn;
        let base = self.base_domain();
        let email = &self.admin_email;
        let password = &self.admin_password;
        let nginx_conf = format!("/etc/nginx/sites-available/{base}");
        let nginx_site = self.render_nginx_site();

        format!(
            r#"#!/bin/bash

set -e

DOMAIN_NAME="{fqdn}"
ADMIN_EMAIL="{email}"
MAILCOW_ADMIN_PASSWORD="{password}"
MAILCOW_DIR="/opt/mailcow-dockerized"
MAILCOW_GIT="https://github.com/mailcow/mailcow-dockerized.git"

echo "Updating system and installing dependencies..."
apt-get update
DEBIAN_FRONTEND=noninteractive apt-get install -y curl docker.io git netcat-openbsd ufw nginx certbot

echo "Installing docker-compose..."
DOCKER_COMPOSE_VERSION="v2.24.5"
curl -SL https://github.com/docker/compose/releases/download/$DOCKER_COMPOSE_VERSION/docker-compose-linux-x86_64 -o /usr/local/bin/docker-compose
chmod +x /usr/local/bin/docker-compose
ln -sf /usr/local/bin/docker-compose /usr/bin/docker-compose

echo "Enabling and starting Docker service..."
systemctl enable docker
systemctl start docker

echo "Preparing Mailcow checkout..."
mkdir -p "$MAILCOW_DIR"
cd "$MAILCOW_DIR" || exit 1

if [ -d ".git" ]; then
    echo "Mailcow repo already exists, pulling latest changes..."
    git pull
else
    echo "Cloning Mailcow repository..."
    git clone "$MAILCOW_GIT" .
fi

echo "Generating Mailcow configuration..."
# Non-interactive input: hostname, timezone, branch (1 = master)
printf '%s\nEtc/UTC\n1\n' "$DOMAIN_NAME" | ./generate_config.sh

echo "Configuring Mailcow admin credentials..."
sed -i "s/^MAILCOW_ADMIN_PASS=.*/MAILCOW_ADMIN_PASS=$MAILCOW_ADMIN_PASSWORD/" mailcow.conf
sed -i "s/^MAILCOW_ADMIN_EMAIL=.*/MAILCOW_ADMIN_EMAIL=$ADMIN_EMAIL/" mailcow.conf
echo "ADDITIONAL_SAN=webmail.$DOMAIN_NAME,admin.$DOMAIN_NAME" >> mailcow.conf

echo "Allowing required ports through UFW..."
for port in 22 25 465 587 110 995 143 993 4190 80 443; do
    ufw allow "$port/tcp"
done
ufw status | grep -qw inactive && echo "Enabling UFW firewall..." && ufw --force enable
ufw reload || true

echo "Pulling Mailcow containers..."
docker-compose pull

echo "Requesting Let's Encrypt certificate via HTTP challenge..."
mkdir -p /var/www/html
certbot certonly --webroot -w /var/www/html \
  -d {base} -d {fqdn} -d autodiscover.{base} -d autoconfig.{base} \
  --agree-tos --no-eff-email --email {email} --non-interactive

echo "Starting Mailcow containers..."
docker-compose up -d

echo "Writing Nginx configuration file to {nginx_conf}..."
cat > {nginx_conf} <<'NGINXEOF'
{nginx_site}
NGINXEOF

echo "Enabling Nginx site and reloading service..."
ln -sf {nginx_conf} /etc/nginx/sites-enabled/
nginx -t
systemctl reload nginx

echo "Mailcow setup completed successfully with Nginx reverse proxy and SSL!"
"#
        )
    }

    /// Renders the nginx vhost fronting Mailcow.
    fn render_nginx_site(&self) -> String {
        let fqdn = &self.fqdn;
        let base = self.base_domain();

        format!(
            "server {{
    listen 443 ssl http2;
    listen [::]:443 ssl http2;

    server_name {base} {fqdn} autodiscover.{base} autoconfig.{base};
    client_max_body_size 1G;

    location / {{
        proxy_pass http://localhost:8080;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}

    ssl_certificate /etc/letsencrypt/live/{base}/fullchain.pem;
    ssl_certificate_key /etc/letsencrypt/live/{base}/privkey.pem;

    ssl_session_timeout 1d;
    ssl_session_cache shared:SSL:50m;
    ssl_session_tickets off;

    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_prefer_server_ciphers on;

    add_header Strict-Transport-Security \"max-age=63072000; includeSubDomains; preload\" always;
    add_header X-Frame-Options \"SAMEORIGIN\" always;
    add_header X-Content-Type-Options \"nosniff\" always;
    add_header Referrer-Policy \"no-referrer\" always;
}}

server {{
    listen 80;
    listen [::]:80;

    server_name {base} {fqdn} autodiscover.{base} autoconfig.{base};

    location /.well-known/acme-challenge/ {{
        root /var/www/html;
    }}

    location / {{
        return 301 https://$host$request_uri;
    }}
}}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> BootstrapScript {
        BootstrapScript::new("smtp.example.com", "admin@example.com", "smtppass123!")
    }

    #[test]
    fn test_base_domain_strips_service_label() {
        assert_eq!(script().base_domain(), "example.com");
    }

    #[test]
    fn test_base_domain_keeps_two_label_fqdn() {
        let s = BootstrapScript::new("example.com", "admin@example.com", "pw");
        assert_eq!(s.base_domain(), "example.com");
    }

    #[test]
    fn test_render_embeds_inputs() {
        let rendered = script().render();
        assert!(rendered.starts_with("#!/bin/bash"));
        assert!(rendered.contains("DOMAIN_NAME=\"smtp.example.com\""));
        assert!(rendered.contains("MAILCOW_ADMIN_PASSWORD=\"smtppass123!\""));
        assert!(rendered.contains("--email admin@example.com"));
    }

    #[test]
    fn test_render_configures_nginx_for_all_hosts() {
        let rendered = script().render();
        assert!(rendered.contains("autodiscover.example.com"));
        assert!(rendered.contains("autoconfig.example.com"));
        assert!(rendered.contains("/etc/nginx/sites-available/example.com"));
    }
}
