//! Localized call messages

use crate::entities::{EmotionalState, EscalationCause, Metric, VitalSnapshot};

/// Message templates for one locale.
///
/// Placeholders: `{heart_rate}`, `{spo2}`, `{temperature}`, `{emotion}`, `{metrics}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplates {
    pub locale: String,
    /// Text-to-speech voice used by the call provider
    pub voice: String,
    /// Text-to-speech language tag
    pub language: String,
    pub preamble: String,
    /// Prepended to the reason of vitals-triggered calls
    pub auto_prefix: String,
    pub heart_rate: String,
    pub spo2: String,
    pub temperature: String,
    pub multiple: String,
    pub fall: String,
    pub help: String,
    pub summary: String,
    pub closing: String,
    /// Indexed by `EmotionalState::rank`
    pub emotion_labels: [String; 4],
    /// Heart rate, SpO2, temperature
    pub metric_names: [String; 3],
    pub list_separator: String,
}

impl MessageTemplates {
    pub fn arabic() -> Self {
        Self {
            locale: "ar".to_string(),
            voice: "Polly.Zeina".to_string(),
            language: "ar-SA".to_string(),
            preamble: "نظام رفيق للمراقبة الصحية. تنبيه عاجل.".to_string(),
            auto_prefix: "تنبيه تلقائي. ".to_string(),
            heart_rate: "دقات القلب {heart_rate}. أعلى من الحد الطبيعي".to_string(),
            spo2: "مستوى الأكسجين منخفض. {spo2} بالمئة".to_string(),
            temperature: "درجة الحرارة غير طبيعية. {temperature} درجة".to_string(),
            multiple: "حالة طوارئ عامة. مؤشرات حرجة: {metrics}".to_string(),
            fall: "كشف السقوط. تحتاج إلى مساعدة فورية".to_string(),
            help: "المريض يطلب المساعدة. الحالة النفسية: {emotion}".to_string(),
            summary: "معدل النبض {heart_rate}. الأكسجين {spo2} بالمئة. درجة الحرارة {temperature}.".to_string(),
            closing: "يرجى التحقق من حالة المريض فوراً.".to_string(),
            emotion_labels: [
                "مستقر".to_string(),
                "توتر خفيف".to_string(),
                "ضيق متوسط".to_string(),
                "ضيق شديد".to_string(),
            ],
            metric_names: ["النبض".to_string(), "الأكسجين".to_string(), "الحرارة".to_string()],
            list_separator: "، ".to_string(),
        }
    }

    pub fn english() -> Self {
        Self {
            locale: "en".to_string(),
            voice: "Polly.Joanna".to_string(),
            language: "en-US".to_string(),
            preamble: "Rafeeq health monitoring system. Urgent alert.".to_string(),
            auto_prefix: "Automatic alert. ".to_string(),
            heart_rate: "Heart rate {heart_rate}. Above the normal range".to_string(),
            spo2: "Oxygen level is low. {spo2} percent".to_string(),
            temperature: "Abnormal body temperature. {temperature} degrees".to_string(),
            multiple: "General emergency. Critical readings: {metrics}".to_string(),
            fall: "Fall detected. Immediate assistance needed".to_string(),
            help: "The patient is asking for help. Emotional state: {emotion}".to_string(),
            summary: "Pulse {heart_rate}. Oxygen {spo2} percent. Temperature {temperature}.".to_string(),
            closing: "Please check on the patient immediately.".to_string(),
            emotion_labels: [
                "STABLE".to_string(),
                "MILD STRESS".to_string(),
                "MODERATE DISTRESS".to_string(),
                "CRITICAL DISTRESS".to_string(),
            ],
            metric_names: ["heart rate".to_string(), "oxygen".to_string(), "temperature".to_string()],
            list_separator: ", ".to_string(),
        }
    }

    /// Built-in templates for a locale code
    pub fn for_locale(locale: &str) -> Option<Self> {
        match locale.trim().to_ascii_lowercase().as_str() {
            "ar" => Some(Self::arabic()),
            "en" => Some(Self::english()),
            _ => None,
        }
    }

    pub fn emotion_label(&self, state: EmotionalState) -> &str {
        &self.emotion_labels[state.rank()]
    }

    pub fn metric_name(&self, metric: Metric) -> &str {
        let index = match metric {
            Metric::HeartRate => 0,
            Metric::Spo2 => 1,
            Metric::Temperature => 2,
        };
        &self.metric_names[index]
    }

    /// Build the spoken message for an emergency transition
    pub fn render(&self, cause: &EscalationCause, snapshot: Option<&VitalSnapshot>, emotion: EmotionalState) -> String {
        let reason = match cause {
            EscalationCause::VitalSigns { metrics, .. } => {
                let template = match metrics.as_slice() {
                    [Metric::HeartRate] => &self.heart_rate,
                    [Metric::Spo2] => &self.spo2,
                    [Metric::Temperature] => &self.temperature,
                    _ => &self.multiple,
                };
                format!("{}{}", self.auto_prefix, self.fill(template, snapshot, emotion, metrics))
            }
            EscalationCause::FallDetected => self.fill(&self.fall, snapshot, emotion, &[]),
            EscalationCause::HelpRequested => self.fill(&self.help, snapshot, emotion, &[]),
            EscalationCause::DispatchCompleted { .. } => self.fill(&self.multiple, snapshot, emotion, &[]),
        };

        let mut lines = vec![self.preamble.clone(), format!("{}.", reason)];
        if snapshot.is_some() {
            lines.push(self.fill(&self.summary, snapshot, emotion, &[]));
        }
        lines.push(self.closing.clone());
        lines.join("\n")
    }

    fn fill(&self, template: &str, snapshot: Option<&VitalSnapshot>, emotion: EmotionalState, metrics: &[Metric]) -> String {
        let mut text = template
            .replace("{emotion}", self.emotion_label(emotion))
            .replace(
                "{metrics}",
                &metrics
                    .iter()
                    .map(|m| self.metric_name(*m))
                    .collect::<Vec<_>>()
                    .join(&self.list_separator),
            );

        if let Some(snapshot) = snapshot {
            text = text
                .replace("{heart_rate}", &snapshot.heart_rate.to_string())
                .replace("{spo2}", &snapshot.spo2.to_string())
                .replace("{temperature}", &snapshot.temperature.to_string());
        }
        text
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self::arabic()
    }
}
