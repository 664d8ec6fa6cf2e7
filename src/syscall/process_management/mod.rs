mod exit;
